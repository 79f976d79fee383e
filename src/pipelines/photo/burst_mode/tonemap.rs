// SPDX-License-Identifier: GPL-3.0-only

//! Shadow lift tone curve
//!
//! Pixels darker than mid-grey get a luminance-dependent gain, strongest in
//! deep shadows and fading to 1.0 at `SHADOW_KNEE`. Highlights are untouched.

use crate::pipelines::photo::LinearImage;
use tracing::{debug, warn};

/// Luminance where the lift has faded out
const SHADOW_KNEE: f32 = 0.5;

/// Gain curve `1 + lift * (1 - L / knee)^2` below the knee
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowLiftCurve {
    lift: f32,
}

impl ShadowLiftCurve {
    /// `None` when `lift` is not a finite value in [0, 1]
    pub fn new(lift: f32) -> Option<Self> {
        (lift.is_finite() && (0.0..=1.0).contains(&lift)).then_some(Self { lift })
    }

    #[inline]
    pub fn gain(&self, luminance: f32) -> f32 {
        if luminance >= SHADOW_KNEE || luminance.is_nan() {
            return 1.0;
        }
        let t = 1.0 - luminance.max(0.0) / SHADOW_KNEE;
        1.0 + self.lift * t * t
    }
}

/// Applies the shadow lift, or passes images through if no curve is available
#[derive(Debug, Clone)]
pub struct ToneMapper {
    curve: Option<ShadowLiftCurve>,
}

impl ToneMapper {
    pub fn new(lift: f32) -> Self {
        let curve = ShadowLiftCurve::new(lift);
        if curve.is_none() {
            warn!(lift, "Shadow lift unavailable, tone mapping passes images through");
        }
        Self { curve }
    }

    pub fn is_pass_through(&self) -> bool {
        self.curve.is_none()
    }

    pub fn apply(&self, mut image: LinearImage) -> LinearImage {
        let Some(curve) = self.curve else {
            debug!("Tone mapping skipped");
            return image;
        };

        for pixel in image.pixels_mut() {
            let [r, g, b] = pixel.0;
            let gain = curve.gain(0.299 * r + 0.587 * g + 0.114 * b);
            pixel.0 = [r * gain, g * gain, b * gain];
        }
        image
    }
}

impl Default for ToneMapper {
    fn default() -> Self {
        Self::new(crate::constants::SHADOW_LIFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_shadows_lifted_highlights_untouched() {
        let mapper = ToneMapper::default();
        let image = LinearImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([0.1, 0.1, 0.1])
            } else {
                Rgb([0.8, 0.8, 0.8])
            }
        });

        let mapped = mapper.apply(image);
        // 0.1 * (1 + 0.2 * 0.8^2)
        assert!((mapped.get_pixel(0, 0).0[0] - 0.1128).abs() < 1e-5);
        assert_eq!(mapped.get_pixel(1, 0).0, [0.8, 0.8, 0.8]);
    }

    #[test]
    fn test_curve_is_monotonic() {
        let curve = ShadowLiftCurve::new(0.2).unwrap();
        let mut previous = 0.0;
        for i in 0..=100 {
            let l = i as f32 / 100.0;
            let out = l * curve.gain(l);
            assert!(out >= previous);
            previous = out;
        }
    }

    #[test]
    fn test_invalid_lift_passes_through() {
        let mapper = ToneMapper::new(f32::NAN);
        assert!(mapper.is_pass_through());

        let image = LinearImage::from_pixel(3, 3, Rgb([0.05, 0.1, 0.2]));
        assert_eq!(mapper.apply(image.clone()).as_raw(), image.as_raw());
    }
}
