// SPDX-License-Identifier: GPL-3.0-only

//! Translation alignment by FFT phase correlation
//!
//! The shift between a frame and the reference is found from the peak of the
//! inverse FFT of their normalized cross-power spectrum:
//!
//! ```text
//! luminance → (downsample) → Hann window → FFT ─┐
//!                                               ├─ F_mov · conj(F_ref) / |…| → IFFT → peak
//! luminance → (downsample) → Hann window → FFT ─┘
//! ```
//!
//! Estimation never fails. Anything that prevents a trustworthy estimate
//! yields the identity transform and the frame is merged unshifted.

use crate::config::AlignmentSettings;
use crate::constants::alignment::MIN_IMAGE_DIM;
use crate::pipelines::photo::LinearImage;
use image::Rgb;
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pure 2-D translation
///
/// A frame with transform `(dx, dy)` satisfies
/// `moving(x, y) ≈ reference(x - dx, y - dy)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlignmentTransform {
    pub dx: f64,
    pub dy: f64,
}

impl AlignmentTransform {
    pub const IDENTITY: Self = Self { dx: 0.0, dy: 0.0 };

    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_identity(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Registers frames against a reference
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    settings: AlignmentSettings,
}

impl Aligner {
    pub fn new(settings: AlignmentSettings) -> Self {
        Self { settings }
    }

    /// Estimate the translation of `moving` relative to `reference`
    pub fn estimate(&self, moving: &LinearImage, reference: &LinearImage) -> AlignmentTransform {
        if moving.dimensions() != reference.dimensions() {
            warn!(
                moving = ?moving.dimensions(),
                reference = ?reference.dimensions(),
                "Cannot align frames of different size, using identity"
            );
            return AlignmentTransform::IDENTITY;
        }

        let (width, height) = reference.dimensions();
        if width < MIN_IMAGE_DIM || height < MIN_IMAGE_DIM {
            debug!(width, height, "Frame too small to correlate, using identity");
            return AlignmentTransform::IDENTITY;
        }

        let factor = downsample_factor(width, height, self.settings.max_correlation_dim);
        let (ref_lum, w, h) = box_downsample(&luminance(reference), width, height, factor);
        let (mov_lum, _, _) = box_downsample(&luminance(moving), width, height, factor);

        if is_flat(&ref_lum) || is_flat(&mov_lum) {
            debug!("Frame has no texture to correlate, using identity");
            return AlignmentTransform::IDENTITY;
        }

        let correlator = PhaseCorrelator::new(w, h, self.settings.windowing);
        let Some((dx, dy, peak)) = correlator.correlate(&mov_lum, &ref_lum, w, h) else {
            return AlignmentTransform::IDENTITY;
        };

        if !(dx.is_finite() && dy.is_finite() && peak.is_finite()) {
            warn!("Phase correlation produced a non-finite shift, using identity");
            return AlignmentTransform::IDENTITY;
        }
        if peak < self.settings.min_peak_value as f64 {
            warn!(
                peak,
                min = self.settings.min_peak_value,
                "Correlation peak too weak, using identity"
            );
            return AlignmentTransform::IDENTITY;
        }

        let transform = AlignmentTransform::new(dx * factor as f64, dy * factor as f64);
        debug!(
            dx = transform.dx,
            dy = transform.dy,
            peak,
            factor,
            "Estimated frame shift"
        );
        transform
    }

    /// Resample `image` so it lines up with the reference
    pub fn apply(&self, image: LinearImage, transform: AlignmentTransform) -> LinearImage {
        if transform.is_identity() {
            return image;
        }
        shift_bilinear(&image, transform.dx, transform.dy)
    }
}

/// BT.601 luma of a linear RGB image
fn luminance(image: &LinearImage) -> Vec<f32> {
    image
        .pixels()
        .map(|Rgb([r, g, b])| 0.299 * r + 0.587 * g + 0.114 * b)
        .collect()
}

fn is_flat(values: &[f32]) -> bool {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    !(max - min > 1e-6)
}

fn downsample_factor(width: u32, height: u32, max_dim: u32) -> usize {
    let longest = width.max(height);
    if max_dim == 0 || longest <= max_dim {
        1
    } else {
        longest.div_ceil(max_dim) as usize
    }
}

/// Average `factor`×`factor` blocks, dropping partial blocks at the edges
fn box_downsample(
    values: &[f32],
    width: u32,
    height: u32,
    factor: usize,
) -> (Vec<f32>, usize, usize) {
    let (width, height) = (width as usize, height as usize);
    if factor <= 1 {
        return (values.to_vec(), width, height);
    }

    let out_w = width / factor;
    let out_h = height / factor;
    let scale = 1.0 / (factor * factor) as f32;
    let mut out = vec![0.0f32; out_w * out_h];

    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sum = 0.0f32;
            for y in oy * factor..(oy + 1) * factor {
                let row = &values[y * width + ox * factor..y * width + (ox + 1) * factor];
                sum += row.iter().sum::<f32>();
            }
            out[oy * out_w + ox] = sum * scale;
        }
    }

    (out, out_w, out_h)
}

/// `out(x, y) = image(x + dx, y + dy)`, clamped at the edges
fn shift_bilinear(image: &LinearImage, dx: f64, dy: f64) -> LinearImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    LinearImage::from_fn(width, height, |x, y| {
        let sx = (x as f64 + dx).clamp(0.0, max_x);
        let sy = (y as f64 + dy).clamp(0.0, max_y);

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fx = (sx - x0 as f64) as f32;
        let fy = (sy - y0 as f64) as f32;

        let p00 = image.get_pixel(x0, y0).0;
        let p10 = image.get_pixel(x1, y0).0;
        let p01 = image.get_pixel(x0, y1).0;
        let p11 = image.get_pixel(x1, y1).0;

        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let top = p00[c] + (p10[c] - p00[c]) * fx;
            let bottom = p01[c] + (p11[c] - p01[c]) * fx;
            out[c] = top + (bottom - top) * fy;
        }
        Rgb(out)
    })
}

/// Square FFT correlator sized to the next power of two
struct PhaseCorrelator {
    fft_size: usize,
    forward_fft: Arc<dyn Fft<f32>>,
    inverse_fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl PhaseCorrelator {
    fn new(width: usize, height: usize, windowing: bool) -> Self {
        let fft_size = width.max(height).next_power_of_two();

        let mut planner = FftPlanner::new();
        let forward_fft = planner.plan_fft_forward(fft_size);
        let inverse_fft = planner.plan_fft_inverse(fft_size);

        let window = if windowing {
            hann_window(fft_size)
        } else {
            vec![1.0; fft_size]
        };

        Self {
            fft_size,
            forward_fft,
            inverse_fft,
            window,
        }
    }

    /// Returns `(dx, dy, peak)` of `moving` relative to `reference`
    fn correlate(
        &self,
        moving: &[f32],
        reference: &[f32],
        width: usize,
        height: usize,
    ) -> Option<(f64, f64, f64)> {
        if moving.len() != width * height || reference.len() != width * height {
            return None;
        }

        let mov_fft = self.fft_2d(&self.prepare(moving, width, height));
        let ref_fft = self.fft_2d(&self.prepare(reference, width, height));

        let cross_power: Vec<Complex<f32>> = mov_fft
            .iter()
            .zip(&ref_fft)
            .map(|(&m, &r)| {
                let product = m * r.conj();
                let magnitude = product.norm();
                if magnitude > 1e-10 {
                    product / magnitude
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        let surface = self.ifft_2d(cross_power);
        let (peak_x, peak_y, peak) = self.find_peak(&surface);

        let n = self.fft_size;
        let unwrap = |p: usize| {
            if p > n / 2 {
                p as f64 - n as f64
            } else {
                p as f64
            }
        };
        let (sub_x, sub_y) = self.subpixel_offset(&surface, peak_x, peak_y);

        Some((unwrap(peak_x) + sub_x, unwrap(peak_y) + sub_y, peak as f64))
    }

    /// Zero-pad to the FFT size with the image centered, windowed separably
    fn prepare(&self, values: &[f32], width: usize, height: usize) -> Vec<f32> {
        let n = self.fft_size;
        let mut padded = vec![0.0f32; n * n];
        let offset_x = (n - width) / 2;
        let offset_y = (n - height) / 2;

        let mean = values.iter().sum::<f32>() / values.len() as f32;

        for y in 0..height {
            let wy = self.window[y + offset_y];
            for x in 0..width {
                let wx = self.window[x + offset_x];
                padded[(y + offset_y) * n + x + offset_x] = (values[y * width + x] - mean) * wx * wy;
            }
        }
        padded
    }

    fn fft_2d(&self, values: &[f32]) -> Vec<Complex<f32>> {
        let mut data: Vec<Complex<f32>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.process_2d(&mut data, &self.forward_fft);
        data
    }

    fn ifft_2d(&self, mut data: Vec<Complex<f32>>) -> Vec<f32> {
        self.process_2d(&mut data, &self.inverse_fft);
        let norm = 1.0 / (self.fft_size * self.fft_size) as f32;
        data.iter().map(|c| c.re * norm).collect()
    }

    /// Rows, transpose, rows, transpose back
    fn process_2d(&self, data: &mut [Complex<f32>], fft: &Arc<dyn Fft<f32>>) {
        let n = self.fft_size;
        for row in data.chunks_exact_mut(n) {
            fft.process(row);
        }
        transpose_inplace(data, n);
        for row in data.chunks_exact_mut(n) {
            fft.process(row);
        }
        transpose_inplace(data, n);
    }

    fn find_peak(&self, surface: &[f32]) -> (usize, usize, f32) {
        let n = self.fft_size;
        let (index, value) = surface
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 { (i, v) } else { best }
            });
        (index % n, index / n, value)
    }

    /// Parabolic fit through the peak and its wrapped neighbours
    fn subpixel_offset(&self, surface: &[f32], peak_x: usize, peak_y: usize) -> (f64, f64) {
        let n = self.fft_size;
        let at = |x: usize, y: usize| surface[(y % n) * n + (x % n)] as f64;

        let c = at(peak_x, peak_y);
        let l = at(peak_x + n - 1, peak_y);
        let r = at(peak_x + 1, peak_y);
        let t = at(peak_x, peak_y + n - 1);
        let b = at(peak_x, peak_y + 1);

        let fit = |lo: f64, hi: f64| {
            let denom = 2.0 * (lo + hi - 2.0 * c);
            if denom.abs() > 1e-10 {
                ((lo - hi) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        };

        (fit(l, r), fit(t, b))
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            let t = i as f32 / (n - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
        })
        .collect()
}

fn transpose_inplace(data: &mut [Complex<f32>], n: usize) {
    for y in 0..n {
        for x in (y + 1)..n {
            data.swap(y * n + x, x * n + y);
        }
    }
}
