// SPDX-License-Identifier: MPL-2.0

//! Burst Camera - burst capture and multi-frame fusion
//!
//! This library collects a burst of raw frames, aligns and averages them,
//! and writes one noise-reduced photo (optionally with a representative raw
//! frame alongside it).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame producers (capture devices, raw directories, synthetic frames)
//! - [`pipelines`]: Burst collection and the fusion pipeline
//! - [`config`]: User configuration handling
//! - [`status`]: User-visible status messages
//! - [`storage`]: Artifact storage
//!
//! # Example
//!
//! ```ignore
//! // Fuse the first six frames of a directory:
//! // burst-camera fuse --input ./frames --count 6
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod status;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use pipelines::photo::{BurstCamera, FusionProcessor, OutputMode};
pub use status::{Status, StatusSink};
