// SPDX-License-Identifier: GPL-3.0-only
//! Burst mode photo pipeline
//!
//! Fuses a burst of raw frames into one noise-reduced photo. Averaging N
//! aligned frames of a static scene reduces noise by roughly √N.
//!
//! # Pipeline Overview
//!
//! ```text
//! Raw frames (arrival order)
//!        │
//!        ▼
//! Decoding (undecodable frames are skipped)
//!        │
//!        ▼
//! Alignment (phase correlation against the first decoded frame)
//!        │
//!        ▼
//! Merging (running mean, linear light)
//!        │
//!        ▼
//! Tone Mapping (shadow lift)
//!        │
//!        ▼
//! Encoding (JPEG + optional representative raw)
//! ```
//!
//! Stages run sequentially on the calling thread. The coordinator in
//! [`burst`] makes sure that thread is a blocking worker.

pub mod align;
pub mod burst;
pub mod merge;
pub mod tonemap;

use super::decoding::{FrameDecoder, RawDecoder};
use super::encoding::{PhotoEncoder, select_representative_raw};
use super::{LinearImage, OutputArtifacts, OutputMode};
use crate::config::{AlignmentSettings, Config};
use crate::constants;
use crate::errors::{DecodeError, PipelineError};
use align::{AlignmentTransform, Aligner};
use burst::RawFrame;
use merge::MeanAccumulator;
use std::sync::Arc;
use tonemap::ToneMapper;
use tracing::{debug, error, info, warn};

/// Progress callback for burst mode processing
///
/// Called with progress value (0.0 - 1.0) during processing stages.
/// The callback should be cheap to call as it may be invoked frequently.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Burst mode processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BurstModeConfig {
    /// Lossy encoding quality in (0, 1]
    pub encoding_quality: f32,
    /// Shadow lift strength for tone mapping (0.0 - 1.0)
    pub shadow_lift: f32,
    pub alignment: AlignmentSettings,
}

impl Default for BurstModeConfig {
    fn default() -> Self {
        Self {
            encoding_quality: constants::DEFAULT_ENCODING_QUALITY,
            shadow_lift: constants::SHADOW_LIFT,
            alignment: AlignmentSettings::default(),
        }
    }
}

impl From<&Config> for BurstModeConfig {
    fn from(config: &Config) -> Self {
        Self {
            encoding_quality: config.encoding_quality,
            shadow_lift: config.shadow_lift,
            alignment: config.alignment.clone(),
        }
    }
}

/// Burst mode processing stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurstModePipelineStage {
    #[default]
    Idle,
    Decoding,
    Aligning,
    Merging,
    ToneMapping,
    Encoding,
    Done,
    Failed,
}

/// Decode status of one frame within a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameStatus {
    #[default]
    Undecoded,
    Decoded,
    DecodeFailed(DecodeError),
}

/// What happened to the frames of one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub frames_received: usize,
    pub frames_fused: usize,
    /// Per frame, in arrival order
    pub frame_status: Vec<FrameStatus>,
    /// Per fused frame, reference first
    pub transforms: Vec<AlignmentTransform>,
}

impl PipelineReport {
    /// Frames dropped at decode, with the reason
    pub fn skipped(&self) -> impl Iterator<Item = (usize, &DecodeError)> {
        self.frame_status
            .iter()
            .enumerate()
            .filter_map(|(index, status)| match status {
                FrameStatus::DecodeFailed(e) => Some((index, e)),
                _ => None,
            })
    }
}

/// Successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub artifacts: OutputArtifacts,
    pub report: PipelineReport,
}

/// Decode → align → merge → tone map → encode
pub struct BurstModePipeline {
    decoder: Arc<dyn FrameDecoder>,
    aligner: Aligner,
    tone_mapper: ToneMapper,
    encoder: PhotoEncoder,
    progress: Option<ProgressCallback>,
}

impl BurstModePipeline {
    pub fn new(config: BurstModeConfig) -> Self {
        Self {
            decoder: Arc::new(RawDecoder::default()),
            aligner: Aligner::new(config.alignment),
            tone_mapper: ToneMapper::new(config.shadow_lift),
            encoder: PhotoEncoder::with_quality(config.encoding_quality),
            progress: None,
        }
    }

    /// Replace the raw decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the whole chain over one burst
    ///
    /// Progress stages (when callback is provided):
    /// - 0.00 - 0.30: Decoding (distributed across frames)
    /// - 0.30 - 0.60: Alignment (distributed across frames)
    /// - 0.60 - 0.80: Merging
    /// - 0.80 - 0.85: Tone mapping
    /// - 0.85 - 1.00: Encoding
    pub fn process(
        &self,
        frames: &[RawFrame],
        mode: OutputMode,
    ) -> Result<PipelineRun, PipelineError> {
        let total_start = std::time::Instant::now();
        info!(frames = frames.len(), %mode, "Processing burst");

        let mut stage = BurstModePipelineStage::Idle;
        let result = self.run_stages(frames, mode, &mut stage);

        match &result {
            Ok(run) => info!(
                total_elapsed_ms = total_start.elapsed().as_millis(),
                fused = run.report.frames_fused,
                received = run.report.frames_received,
                "Burst processing complete"
            ),
            Err(e) => {
                error!(error = %e, stage = ?stage, "Burst processing failed");
                stage = BurstModePipelineStage::Failed;
                debug!(stage = ?stage, "Pipeline stopped");
            }
        }
        result
    }

    fn report(&self, value: f32) {
        if let Some(cb) = &self.progress {
            cb(value);
        }
    }

    fn run_stages(
        &self,
        frames: &[RawFrame],
        mode: OutputMode,
        stage: &mut BurstModePipelineStage,
    ) -> Result<PipelineRun, PipelineError> {
        let count = frames.len().max(1) as f32;
        self.report(0.0);

        // Decoding (0% - 30%)
        *stage = BurstModePipelineStage::Decoding;
        let step_start = std::time::Instant::now();
        let mut frame_status = vec![FrameStatus::Undecoded; frames.len()];
        let mut decoded: Vec<LinearImage> = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            match self.decoder.decode(&frame.data) {
                Ok(image) => {
                    frame_status[i] = FrameStatus::Decoded;
                    decoded.push(image);
                }
                Err(e) => {
                    warn!(frame = i, error = %e, "Skipping undecodable frame");
                    frame_status[i] = FrameStatus::DecodeFailed(e);
                }
            }
            self.report(0.3 * (i + 1) as f32 / count);
        }
        info!(
            elapsed_ms = step_start.elapsed().as_millis(),
            decoded = decoded.len(),
            "Decoding complete"
        );

        let mut survivors = decoded.into_iter();
        let Some(reference) = survivors.next() else {
            return Err(PipelineError::NoDecodableFrames {
                attempted: frames.len(),
            });
        };

        // Aligning (30% - 60%)
        *stage = BurstModePipelineStage::Aligning;
        let step_start = std::time::Instant::now();
        let others: Vec<LinearImage> = survivors.collect();
        let fused_count = others.len() + 1;
        let mut transforms = vec![AlignmentTransform::IDENTITY];
        let mut aligned = Vec::with_capacity(others.len());
        for (i, image) in others.into_iter().enumerate() {
            let transform = self.aligner.estimate(&image, &reference);
            transforms.push(transform);
            aligned.push(self.aligner.apply(image, transform));
            self.report(0.3 + 0.3 * (i + 2) as f32 / fused_count as f32);
        }
        info!(
            elapsed_ms = step_start.elapsed().as_millis(),
            aligned = aligned.len(),
            "Frame alignment complete"
        );
        self.report(0.6);

        // Merging (60% - 80%)
        *stage = BurstModePipelineStage::Merging;
        let step_start = std::time::Instant::now();
        let (width, height) = reference.dimensions();
        let mut acc = MeanAccumulator::new(width, height, fused_count)?;
        acc.add(&reference)?;
        drop(reference);
        for image in &aligned {
            acc.add(image)?;
        }
        drop(aligned);
        let merged = acc.finish()?;
        info!(
            elapsed_ms = step_start.elapsed().as_millis(),
            "Frame merge complete"
        );
        self.report(0.8);

        // Tone mapping (80% - 85%)
        *stage = BurstModePipelineStage::ToneMapping;
        let toned = self.tone_mapper.apply(merged);
        self.report(0.85);

        // Encoding (85% - 100%)
        *stage = BurstModePipelineStage::Encoding;
        let step_start = std::time::Instant::now();
        let encoded_image = self.encoder.encode_image(&toned)?;
        let raw_frame = if mode.includes_raw() {
            select_representative_raw(frames).map(|frame| {
                debug!(arrival = frame.arrival, "Keeping representative raw frame");
                Arc::clone(&frame.data)
            })
        } else {
            None
        };
        info!(
            elapsed_ms = step_start.elapsed().as_millis(),
            size = encoded_image.len(),
            "Encoding complete"
        );
        self.report(1.0);

        *stage = BurstModePipelineStage::Done;
        Ok(PipelineRun {
            artifacts: OutputArtifacts {
                encoded_image,
                raw_frame,
            },
            report: PipelineReport {
                frames_received: frames.len(),
                frames_fused: fused_count,
                frame_status,
                transforms,
            },
        })
    }
}

impl Default for BurstModePipeline {
    fn default() -> Self {
        Self::new(BurstModeConfig::default())
    }
}
