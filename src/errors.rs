// SPDX-License-Identifier: GPL-3.0-only

//! Error types for burst capture and fusion

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Burst session bookkeeping errors
    Burst(BurstError),
    /// Fusion pipeline failures (fatal to one run)
    Pipeline(PipelineError),
    /// Frame source errors
    Source(SourceError),
    /// Artifact storage errors
    Storage(StorageError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Burst coordinator errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstError {
    /// A burst must contain at least one frame
    InvalidFrameCount(usize),
    /// A session is still collecting frames
    SessionActive { collected: usize, expected: usize },
    /// A frame arrived while no burst was collecting
    NoActiveBurst,
    /// The session was discarded before it completed
    Abandoned,
    /// The processing worker stopped without reporting a result
    WorkerFailed(String),
}

/// Per-frame decode failures (the frame is dropped, the run continues)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length blob
    Empty,
    /// Container could not be parsed
    Unparseable(String),
    /// Sensor colour filter layout the decoder cannot demosaic
    UnsupportedPattern(String),
    /// Sample layout or bit depth the decoder cannot convert
    UnsupportedSampleFormat(String),
}

/// Lossy encoder failures
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// Image buffer is empty or inconsistent
    InvalidImage(String),
    /// Quality must lie in (0, 1]
    InvalidQuality(f32),
    /// Encoder backend failed
    Backend(String),
}

/// Merge stage failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Nothing to average
    NoFrames,
    /// Frame dimensions differ from the accumulator
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

/// Fatal pipeline failures
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Every frame in the burst failed to decode
    NoDecodableFrames { attempted: usize },
    /// Merge precondition violated
    Merge(MergeError),
    /// Encoding the fused image failed
    Encode(EncodeError),
}

/// Frame source errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Filesystem access failed
    Io(String),
    /// Fixture directory holds fewer frames than requested
    NotEnoughFrames { found: usize, requested: usize },
    /// Capture device reported a failure
    Device(String),
}

/// Artifact storage errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing to the store failed
    Io(String),
    /// Store cannot be used at all
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Burst(e) => write!(f, "Burst error: {}", e),
            AppError::Pipeline(e) => write!(f, "{}", e),
            AppError::Source(e) => write!(f, "Frame source error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for BurstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstError::InvalidFrameCount(count) => {
                write!(f, "Invalid burst size {} (must be at least 1)", count)
            }
            BurstError::SessionActive {
                collected,
                expected,
            } => write!(
                f,
                "A burst is already collecting ({}/{} frames)",
                collected, expected
            ),
            BurstError::NoActiveBurst => write!(f, "No burst is collecting frames"),
            BurstError::Abandoned => write!(f, "Burst was abandoned before completion"),
            BurstError::WorkerFailed(msg) => write!(f, "Processing worker failed: {}", msg),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty raw container"),
            DecodeError::Unparseable(msg) => write!(f, "unparseable raw container: {}", msg),
            DecodeError::UnsupportedPattern(name) => {
                write!(f, "unsupported sensor pattern: {}", name)
            }
            DecodeError::UnsupportedSampleFormat(msg) => {
                write!(f, "unsupported sample format: {}", msg)
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidImage(msg) => write!(f, "invalid image buffer: {}", msg),
            EncodeError::InvalidQuality(q) => {
                write!(f, "encoding quality {} outside (0, 1]", q)
            }
            EncodeError::Backend(msg) => write!(f, "encoder backend failed: {}", msg),
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::NoFrames => write!(f, "no frames to merge"),
            MergeError::DimensionMismatch { expected, found } => write!(
                f,
                "frame is {}x{}, expected {}x{}",
                found.0, found.1, expected.0, expected.1
            ),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoDecodableFrames { attempted } => {
                write!(f, "no decodable frames ({} attempted)", attempted)
            }
            PipelineError::Merge(e) => write!(f, "merge failed: {}", e),
            PipelineError::Encode(e) => write!(f, "encoding failed: {}", e),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Io(msg) => write!(f, "I/O error: {}", msg),
            SourceError::NotEnoughFrames { found, requested } => write!(
                f,
                "found {} raw frames, burst needs {}",
                found, requested
            ),
            SourceError::Device(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "write failed: {}", msg),
            StorageError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for BurstError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for EncodeError {}
impl std::error::Error for MergeError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for SourceError {}
impl std::error::Error for StorageError {}

// Conversions from sub-errors to AppError
impl From<BurstError> for AppError {
    fn from(err: BurstError) -> Self {
        AppError::Burst(err)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        AppError::Source(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<MergeError> for PipelineError {
    fn from(err: MergeError) -> Self {
        PipelineError::Merge(err)
    }
}

impl From<EncodeError> for PipelineError {
    fn from(err: EncodeError) -> Self {
        PipelineError::Encode(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}
