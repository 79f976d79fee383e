// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for frame acquisition
//!
//! This module provides the concrete producers of raw frames:
//! - Capture devices driven by [`LiveFrameSource`](crate::pipelines::photo::capture::LiveFrameSource)
//! - A directory of raw files played back as a deterministic burst
//! - Synthetic raw frames for fixtures and tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              BurstCoordinator               │
//! └────────────────────┬────────────────────────┘
//!                      │ FrameSink
//! ┌────────────────────┴────────────────────────┐
//! │                FrameSource                  │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │ LiveFrameSource  │  │ DirectoryFrame- │  │
//! │  │  (CaptureDevice) │  │     Source      │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`file_source`]: Directory-backed frame source
//! - [`synthetic`]: Synthetic TIFF frames and a simulated capture device

pub mod file_source;
pub mod synthetic;

use crate::errors::SourceError;
use std::future::Future;

/// A device that captures one raw frame per request
///
/// Requests for the frames of one burst run concurrently and may complete
/// in any order.
pub trait CaptureDevice: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Capture frame `index` of the current burst as a raw container blob
    fn capture_frame(
        &self,
        index: usize,
    ) -> impl Future<Output = Result<Vec<u8>, SourceError>> + Send;
}
