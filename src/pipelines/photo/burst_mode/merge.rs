// SPDX-License-Identifier: GPL-3.0-only

//! Frame merging by arithmetic mean in linear space
//!
//! Frames are folded into a single f64 accumulator as `acc += frame / N`, so
//! memory stays at one buffer regardless of burst size and nothing is clipped
//! before the final conversion.

use crate::errors::MergeError;
use crate::pipelines::photo::LinearImage;
use image::Rgb;

/// Running mean over a known number of frames
#[derive(Debug)]
pub struct MeanAccumulator {
    width: u32,
    height: u32,
    weight: f64,
    expected: usize,
    added: usize,
    acc: Vec<f64>,
}

impl MeanAccumulator {
    pub fn new(width: u32, height: u32, count: usize) -> Result<Self, MergeError> {
        if count == 0 {
            return Err(MergeError::NoFrames);
        }
        Ok(Self {
            width,
            height,
            weight: 1.0 / count as f64,
            expected: count,
            added: 0,
            acc: vec![0.0; width as usize * height as usize * 3],
        })
    }

    pub fn add(&mut self, image: &LinearImage) -> Result<(), MergeError> {
        if image.dimensions() != (self.width, self.height) {
            return Err(MergeError::DimensionMismatch {
                expected: (self.width, self.height),
                found: image.dimensions(),
            });
        }
        for (acc, &sample) in self.acc.iter_mut().zip(image.as_raw()) {
            *acc += sample as f64 * self.weight;
        }
        self.added += 1;
        Ok(())
    }

    /// Frames folded in so far
    pub fn added(&self) -> usize {
        self.added
    }

    pub fn finish(self) -> Result<LinearImage, MergeError> {
        if self.added == 0 {
            return Err(MergeError::NoFrames);
        }
        // Fewer frames than announced: rescale so the result is still a mean
        let correction = self.expected as f64 / self.added as f64;
        let width = self.width as usize;
        Ok(LinearImage::from_fn(self.width, self.height, |x, y| {
            let i = (y as usize * width + x as usize) * 3;
            Rgb([
                (self.acc[i] * correction) as f32,
                (self.acc[i + 1] * correction) as f32,
                (self.acc[i + 2] * correction) as f32,
            ])
        }))
    }
}

/// Per-pixel, per-channel mean of equally sized frames
pub fn average(images: &[LinearImage]) -> Result<LinearImage, MergeError> {
    let first = images.first().ok_or(MergeError::NoFrames)?;
    let (width, height) = first.dimensions();
    let mut acc = MeanAccumulator::new(width, height, images.len())?;
    for image in images {
        acc.add(image)?;
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_frames_average_to_constant() {
        let color = Rgb([0.18f32, 0.42, 0.9]);
        let frames = vec![LinearImage::from_pixel(8, 5, color); 7];

        let merged = average(&frames).unwrap();
        for pixel in merged.pixels() {
            for c in 0..3 {
                assert!((pixel.0[c] - color.0[c]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_mean_is_order_insensitive() {
        let frames: Vec<LinearImage> = (0..5)
            .map(|i: u32| {
                LinearImage::from_fn(4, 4, |x, y| {
                    Rgb([(i * x) as f32 * 0.1, y as f32 * 0.2, 0.3 * i as f32])
                })
            })
            .collect();
        let mut reversed = frames.clone();
        reversed.reverse();

        let forward = average(&frames).unwrap();
        let backward = average(&reversed).unwrap();
        for (a, b) in forward.as_raw().iter().zip(backward.as_raw()) {
            assert!((a - b).abs() < 1e-5);
        }
        // Mean of i over 0..5 is 2
        assert!((forward.get_pixel(0, 0).0[2] - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_values_above_one_are_not_clipped() {
        let frames = vec![
            LinearImage::from_pixel(2, 2, Rgb([3.0, 0.0, 0.0])),
            LinearImage::from_pixel(2, 2, Rgb([1.0, 0.0, 0.0])),
        ];
        assert!((average(&frames).unwrap().get_pixel(1, 1).0[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_mismatched_input() {
        assert_eq!(average(&[]).unwrap_err(), MergeError::NoFrames);

        let frames = vec![LinearImage::new(4, 4), LinearImage::new(4, 3)];
        assert_eq!(
            average(&frames).unwrap_err(),
            MergeError::DimensionMismatch {
                expected: (4, 4),
                found: (4, 3)
            }
        );
    }

    #[test]
    fn test_partial_accumulation_is_rescaled() {
        let mut acc = MeanAccumulator::new(3, 2, 4).unwrap();
        acc.add(&LinearImage::from_pixel(3, 2, Rgb([0.2, 0.4, 0.6])))
            .unwrap();
        acc.add(&LinearImage::from_fn(3, 2, |x, _| Rgb([x as f32 * 0.1, 0.4, 0.6])))
            .unwrap();
        assert_eq!(acc.added(), 2);

        // Two of four announced frames: still the mean of what was added
        let merged = acc.finish().unwrap();
        assert!((merged.get_pixel(2, 1).0[0] - 0.2).abs() < 1e-6);
        assert!((merged.get_pixel(0, 0).0[0] - 0.1).abs() < 1e-6);
        assert!((merged.get_pixel(1, 0).0[2] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_finish_without_frames() {
        let acc = MeanAccumulator::new(2, 2, 3).unwrap();
        assert_eq!(acc.added(), 0);
        assert_eq!(acc.finish().unwrap_err(), MergeError::NoFrames);
    }
}
