// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for burst operations
//!
//! This module provides command-line functionality for:
//! - Fusing a burst read from a directory of raw frames
//! - Writing synthetic raw frames to use as a burst fixture

use burst_camera::Config;
use burst_camera::backends::file_source::DirectoryFrameSource;
use burst_camera::backends::synthetic::{SyntheticFrame, encode_rgb16_tiff};
use burst_camera::constants;
use burst_camera::pipelines::photo::{BurstCamera, FusionProcessor, OutputMode};
use burst_camera::status::ChannelStatusSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for `fuse`
pub struct FuseOptions {
    pub input: PathBuf,
    pub count: Option<usize>,
    pub mode: Option<OutputMode>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Fuse the first N raw frames of a directory into one photo
pub fn fuse(options: FuseOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(count) = options.count {
        config.burst_size = count;
    }
    if let Some(mode) = options.mode {
        config.output_mode = mode;
    }
    if let Some(output) = options.output {
        config.output_dir = Some(output);
    }
    config.validate()?;

    println!(
        "Fusing {} frames from {} ({})",
        config.burst_size,
        options.input.display(),
        config.output_mode
    );

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let (status, mut messages) = ChannelStatusSink::new();
        let status = Arc::new(status);

        let camera = BurstCamera::new(
            FusionProcessor::from_config(&config, status.clone()),
            Arc::new(DirectoryFrameSource::new(&options.input)),
            status,
            tokio::runtime::Handle::current(),
        );

        let outcome = match camera.start_burst(config.burst_size, config.output_mode).await {
            Ok(ticket) => ticket.wait().await.map_err(Into::into).and_then(|r| r),
            Err(e) => Err(e),
        };

        while let Ok(message) = messages.try_recv() {
            println!("  {}", message);
        }
        outcome
    });

    let result = result?;
    println!();
    println!("Photo saved: {}", result.stored.photo.display());
    if let Some(raw) = &result.stored.raw {
        println!("Raw saved:   {}", raw.display());
    }
    println!(
        "Frames fused: {}/{}",
        result.report.frames_fused, result.report.frames_received
    );

    Ok(())
}

/// Options for `synth`
pub struct SynthOptions {
    pub output: PathBuf,
    pub count: usize,
    pub width: u32,
    pub height: u32,
    pub level: f32,
    pub noise: f32,
    pub seed: u64,
}

/// Write `count` synthetic 16-bit TIFF frames named `frame_000.tif`, ...
pub fn synth(options: SynthOptions) -> Result<(), Box<dyn std::error::Error>> {
    if options.count == 0 || options.count > constants::MAX_BURST_SIZE {
        return Err(format!(
            "Frame count must be between 1 and {}",
            constants::MAX_BURST_SIZE
        )
        .into());
    }
    if options.width == 0 || options.height == 0 {
        return Err("Frame dimensions must be non-zero".into());
    }

    std::fs::create_dir_all(&options.output)?;

    for index in 0..options.count {
        let frame = SyntheticFrame::solid(options.width, options.height, options.level)
            .with_noise(options.noise, options.seed.wrapping_add(index as u64));
        let path = frame_path(&options.output, index);
        std::fs::write(&path, encode_rgb16_tiff(&frame)?)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{:03}.tif", index))
}
