// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! This module renders the fused linear image to a JPEG byte stream and picks
//! the raw frame that is kept next to it:
//! - Linear light is converted with the sRGB transfer function
//! - Samples are clamped and quantized to 8 bits
//! - JPEG quality is `round(quality * 100)`

use super::LinearImage;
use crate::constants::DEFAULT_ENCODING_QUALITY;
use crate::errors::EncodeError;
use image::{Rgb, RgbImage};
use tracing::debug;

/// JPEG encoder for fused images
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    quality: f32,
}

impl PhotoEncoder {
    /// Create an encoder at the default quality (0.92)
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_ENCODING_QUALITY,
        }
    }

    /// Create an encoder with a custom quality
    ///
    /// Quality outside (0, 1] makes every `encode_image` call fail.
    pub fn with_quality(quality: f32) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Encode at this encoder's quality
    pub fn encode_image(&self, image: &LinearImage) -> Result<Vec<u8>, EncodeError> {
        encode(image, self.quality)
    }
}

impl Default for PhotoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_quality(quality: f32) -> Result<(), EncodeError> {
    if quality > 0.0 && quality <= 1.0 {
        Ok(())
    } else {
        Err(EncodeError::InvalidQuality(quality))
    }
}

/// Encode a linear image as JPEG
///
/// # Arguments
/// * `image` - Fused linear-light image
/// * `quality` - Compression quality in (0, 1]
pub fn encode(image: &LinearImage, quality: f32) -> Result<Vec<u8>, EncodeError> {
    validate_quality(quality)?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidImage(format!(
            "{}x{} image",
            width, height
        )));
    }

    let rgb = to_srgb8(image);
    let jpeg_quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);

    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| EncodeError::Backend(format!("JPEG encoding failed: {}", e)))?;

    debug!(
        width,
        height,
        quality = jpeg_quality,
        size = buffer.len(),
        "Encoding complete"
    );
    Ok(buffer)
}

/// Linear to sRGB, clamped and quantized
fn to_srgb8(image: &LinearImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image
            .get_pixel(x, y)
            .0
            .map(|v| (srgb_oetf(v.clamp(0.0, 1.0)) * 255.0).round() as u8))
    })
}

#[inline]
fn srgb_oetf(linear: f32) -> f32 {
    if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// The blob at index `len / 2`, kept verbatim as the raw artifact
pub fn select_representative_raw<T>(blobs: &[T]) -> Option<&T> {
    blobs.get(blobs.len() / 2)
}
