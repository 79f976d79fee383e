// SPDX-License-Identifier: GPL-3.0-only

//! Raw container decoding
//!
//! Turns one raw blob into a linear-light RGB float image:
//! - TIFF based containers (DNG/TIFF strips with grey or RGB samples) are
//!   read with the `tiff` crate
//! - Sensor mosaics (CFA DNGs and camera-native raws) go through `rawloader`
//!   and are demosaiced with `bayer`
//!
//! Decoding always uses neutral parameters. A failure only drops the frame
//! it belongs to.

use super::LinearImage;
use crate::errors::DecodeError;
use std::io::Cursor;
use tracing::debug;

/// Converts one raw container into a linear-light image
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<LinearImage, DecodeError>;
}

/// Gains applied while decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    /// Exposure compensation in stops
    pub exposure_ev: f32,
    /// Linear scale factor
    pub scale: f32,
}

impl DecodeParams {
    /// No exposure boost, unit scale
    pub const fn neutral() -> Self {
        Self {
            exposure_ev: 0.0,
            scale: 1.0,
        }
    }

    fn gain(&self) -> f32 {
        self.scale * self.exposure_ev.exp2()
    }
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Default decoder for TIFF/DNG and camera raw containers
#[derive(Debug, Clone, Default)]
pub struct RawDecoder {
    params: DecodeParams,
}

impl RawDecoder {
    pub fn new(params: DecodeParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> DecodeParams {
        self.params
    }
}

impl FrameDecoder for RawDecoder {
    fn decode(&self, raw: &[u8]) -> Result<LinearImage, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut image = if is_tiff(raw) {
            match decode_tiff(raw) {
                Err(TiffOutcome::Unsupported(reason)) => {
                    debug!(%reason, "TIFF reader cannot handle container, trying raw loader");
                    decode_sensor_raw(raw)?
                }
                Err(TiffOutcome::Failed(e)) => return Err(e),
                Ok(image) => image,
            }
        } else {
            decode_sensor_raw(raw)?
        };

        let gain = self.params.gain();
        if gain != 1.0 {
            image.pixels_mut().for_each(|p| p.0.iter_mut().for_each(|c| *c *= gain));
        }

        debug!(
            width = image.width(),
            height = image.height(),
            bytes = raw.len(),
            "Decoded raw frame"
        );
        Ok(image)
    }
}

/// Little or big endian TIFF header
fn is_tiff(raw: &[u8]) -> bool {
    raw.starts_with(b"II*\0") || raw.starts_with(b"MM\0*")
}

enum TiffOutcome {
    /// The container is TIFF but holds data the TIFF reader does not model
    Unsupported(String),
    Failed(DecodeError),
}

fn decode_tiff(raw: &[u8]) -> Result<LinearImage, TiffOutcome> {
    use tiff::decoder::{Decoder, DecodingResult};
    use tiff::{ColorType, TiffError};

    let classify = |e: TiffError| match e {
        TiffError::UnsupportedError(u) => TiffOutcome::Unsupported(u.to_string()),
        other => TiffOutcome::Failed(DecodeError::Unparseable(other.to_string())),
    };

    let mut decoder = Decoder::new(Cursor::new(raw)).map_err(classify)?;
    let (width, height) = decoder.dimensions().map_err(classify)?;
    let colortype = decoder.colortype().map_err(classify)?;

    let channels = match colortype {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) => 4,
        other => {
            return Err(TiffOutcome::Unsupported(format!("{:?}", other)));
        }
    };

    let samples: Vec<f32> = match decoder.read_image().map_err(classify)? {
        DecodingResult::U8(v) => v.iter().map(|&s| s as f32 / u8::MAX as f32).collect(),
        DecodingResult::U16(v) => v.iter().map(|&s| s as f32 / u16::MAX as f32).collect(),
        DecodingResult::U32(v) => v.iter().map(|&s| (s as f64 / u32::MAX as f64) as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.iter().map(|&s| s as f32).collect(),
        _ => {
            return Err(TiffOutcome::Failed(DecodeError::UnsupportedSampleFormat(
                format!("{:?}", colortype),
            )));
        }
    };

    interleaved_to_rgb(width, height, channels, &samples).map_err(TiffOutcome::Failed)
}

/// Grey is replicated, alpha dropped
fn interleaved_to_rgb(
    width: u32,
    height: u32,
    channels: usize,
    samples: &[f32],
) -> Result<LinearImage, DecodeError> {
    let pixel_count = width as usize * height as usize;
    if pixel_count == 0 {
        return Err(DecodeError::Unparseable("image has no pixels".into()));
    }
    if samples.len() < pixel_count * channels {
        return Err(DecodeError::Unparseable(format!(
            "expected {} samples, found {}",
            pixel_count * channels,
            samples.len()
        )));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for px in samples.chunks_exact(channels).take(pixel_count) {
        if channels < 3 {
            rgb.extend_from_slice(&[px[0], px[0], px[0]]);
        } else {
            rgb.extend_from_slice(&px[..3]);
        }
    }

    LinearImage::from_raw(width, height, rgb)
        .ok_or_else(|| DecodeError::Unparseable("sample buffer size mismatch".into()))
}

fn decode_sensor_raw(raw: &[u8]) -> Result<LinearImage, DecodeError> {
    // rawloader can panic on malformed input
    let decoded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        rawloader::decode(&mut Cursor::new(raw))
    }))
    .map_err(|_| DecodeError::Unparseable("raw loader aborted".into()))?
    .map_err(|e| DecodeError::Unparseable(e.to_string()))?;

    let width = decoded.width;
    let height = decoded.height;
    if width == 0 || height == 0 {
        return Err(DecodeError::Unparseable("image has no pixels".into()));
    }

    debug!(
        make = %decoded.clean_make,
        model = %decoded.clean_model,
        width,
        height,
        cpp = decoded.cpp,
        "Decoded sensor data"
    );

    let values: Vec<f32> = match &decoded.data {
        rawloader::RawImageData::Integer(v) => v.iter().map(|&s| s as f32).collect(),
        rawloader::RawImageData::Float(v) => v.clone(),
    };

    match decoded.cpp {
        3 => {
            let black = decoded.blacklevels[0] as f32;
            let range = (decoded.whitelevels[0] as f32 - black).max(1.0);
            let normalized: Vec<f32> = values.iter().map(|&v| ((v - black) / range).max(0.0)).collect();
            interleaved_to_rgb(width as u32, height as u32, 3, &normalized)
        }
        1 => {
            let pattern = cfa_pattern(&decoded.cfa)?;
            let mosaic: Vec<f32> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let color = decoded.cfa.color_at(i / width, i % width);
                    let black = decoded.blacklevels[color] as f32;
                    let range = (decoded.whitelevels[color] as f32 - black).max(1.0);
                    ((v - black) / range).clamp(0.0, 1.0)
                })
                .collect();
            let mut image = demosaic(&mosaic, width, height, pattern)?;
            apply_white_balance(&mut image, decoded.wb_coeffs);
            Ok(image)
        }
        cpp => Err(DecodeError::UnsupportedSampleFormat(format!(
            "{} components per pixel",
            cpp
        ))),
    }
}

/// Map a 2x2 colour filter array onto the patterns the demosaicer supports
fn cfa_pattern(cfa: &rawloader::CFA) -> Result<bayer::CFA, DecodeError> {
    if cfa.width != 2 || cfa.height != 2 {
        return Err(DecodeError::UnsupportedPattern(cfa.name.clone()));
    }
    let layout = [
        cfa.color_at(0, 0),
        cfa.color_at(0, 1),
        cfa.color_at(1, 0),
        cfa.color_at(1, 1),
    ];
    match layout {
        [0, 1, 1, 2] => Ok(bayer::CFA::RGGB),
        [2, 1, 1, 0] => Ok(bayer::CFA::BGGR),
        [1, 0, 2, 1] => Ok(bayer::CFA::GRBG),
        [1, 2, 0, 1] => Ok(bayer::CFA::GBRG),
        _ => Err(DecodeError::UnsupportedPattern(cfa.name.clone())),
    }
}

fn demosaic(
    mosaic: &[f32],
    width: usize,
    height: usize,
    pattern: bayer::CFA,
) -> Result<LinearImage, DecodeError> {
    use bayer::{BayerDepth, Demosaic, RasterDepth, RasterMut};

    let input: Vec<u8> = mosaic
        .iter()
        .flat_map(|&v| ((v * u16::MAX as f32).round() as u16).to_le_bytes())
        .collect();
    let mut output = vec![0u8; width * height * 3 * 2];

    let mut raster = RasterMut::new(width, height, RasterDepth::Depth16, &mut output);
    bayer::run_demosaic(
        &mut Cursor::new(&input[..]),
        BayerDepth::Depth16LE,
        pattern,
        Demosaic::Linear,
        &mut raster,
    )
    .map_err(|e| DecodeError::Unparseable(format!("demosaic failed: {:?}", e)))?;

    let rgb: Vec<f32> = output
        .chunks_exact(2)
        .map(|b| u16::from_ne_bytes([b[0], b[1]]) as f32 / u16::MAX as f32)
        .collect();

    LinearImage::from_raw(width as u32, height as u32, rgb)
        .ok_or_else(|| DecodeError::Unparseable("demosaic output size mismatch".into()))
}

/// As-shot white balance, normalized to green
fn apply_white_balance(image: &mut LinearImage, wb_coeffs: [f32; 4]) {
    let green = wb_coeffs[1];
    if !(green.is_finite() && green > 0.0) {
        return;
    }
    let gains = [wb_coeffs[0] / green, 1.0, wb_coeffs[2] / green];
    if gains.iter().any(|g| !g.is_finite() || *g <= 0.0) {
        return;
    }
    for pixel in image.pixels_mut() {
        for (c, gain) in pixel.0.iter_mut().zip(gains) {
            *c *= gain;
        }
    }
}
