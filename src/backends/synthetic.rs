// SPDX-License-Identifier: MPL-2.0

//! Synthetic raw frames
//!
//! Produces 16-bit linear RGB TIFF containers the raw decoder understands,
//! plus a simulated capture device that returns them with per-frame delays.

use super::CaptureDevice;
use crate::errors::SourceError;
use crate::pipelines::photo::LinearImage;
use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// A synthetic scene in linear light
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    image: LinearImage,
}

impl SyntheticFrame {
    /// Uniform grey at `level` (0.0 - 1.0)
    pub fn solid(width: u32, height: u32, level: f32) -> Self {
        Self {
            image: LinearImage::from_pixel(width, height, Rgb([level; 3])),
        }
    }

    /// Random grey texture, reproducible from `seed`
    pub fn textured(width: u32, height: u32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            image: LinearImage::from_fn(width, height, |_, _| {
                let v: f32 = rng.random_range(0.05..0.95);
                Rgb([v; 3])
            }),
        }
    }

    /// Add approximately Gaussian noise with standard deviation `sigma`
    pub fn with_noise(mut self, sigma: f32, seed: u64) -> Self {
        if sigma <= 0.0 {
            return self;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for pixel in self.image.pixels_mut() {
            for c in pixel.0.iter_mut() {
                // Irwin-Hall: sum of 12 uniforms has unit variance around 6
                let n: f32 = (0..12).map(|_| rng.random::<f32>()).sum::<f32>() - 6.0;
                *c = (*c + n * sigma).clamp(0.0, 1.0);
            }
        }
        self
    }

    /// `shifted(x, y) = self(x - dx, y - dy)`, wrapping at the edges
    pub fn shifted(&self, dx: i64, dy: i64) -> Self {
        let (w, h) = self.image.dimensions();
        Self {
            image: LinearImage::from_fn(w, h, |x, y| {
                let sx = (x as i64 - dx).rem_euclid(w as i64) as u32;
                let sy = (y as i64 - dy).rem_euclid(h as i64) as u32;
                *self.image.get_pixel(sx, sy)
            }),
        }
    }

    pub fn image(&self) -> &LinearImage {
        &self.image
    }
}

/// Encode a frame as an uncompressed 16-bit RGB TIFF
pub fn encode_rgb16_tiff(frame: &SyntheticFrame) -> Result<Vec<u8>, SourceError> {
    let (width, height) = frame.image.dimensions();
    let samples: Vec<u16> = frame
        .image
        .as_raw()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16)
        .collect();

    let mut buffer = Vec::new();
    {
        let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(|e| SourceError::Device(format!("TIFF encoding failed: {}", e)))?;
        encoder
            .write_image::<tiff::encoder::colortype::RGB16>(width, height, &samples)
            .map_err(|e| SourceError::Device(format!("TIFF encoding failed: {}", e)))?;
    }

    Ok(buffer)
}

/// Simulated camera returning synthetic frames after a per-frame delay
pub struct SyntheticCamera {
    frames: Vec<Vec<u8>>,
    delays: Vec<Duration>,
    failing: HashSet<usize>,
}

impl SyntheticCamera {
    /// Frame `i` of a burst is `frames[i % frames.len()]`
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            delays: Vec::new(),
            failing: HashSet::new(),
        }
    }

    /// Delay before frame `i` completes is `delays[i % delays.len()]`
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Frames at these indices report a capture error
    pub fn with_failures(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failing = indices.into_iter().collect();
        self
    }
}

impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn capture_frame(&self, index: usize) -> Result<Vec<u8>, SourceError> {
        if !self.delays.is_empty() {
            tokio::time::sleep(self.delays[index % self.delays.len()]).await;
        }
        if self.failing.contains(&index) {
            return Err(SourceError::Device(format!("frame {} dropped by sensor", index)));
        }
        if self.frames.is_empty() {
            return Err(SourceError::Device("no frames configured".into()));
        }
        debug!(index, "Synthetic frame captured");
        Ok(self.frames[index % self.frames.len()].clone())
    }
}
