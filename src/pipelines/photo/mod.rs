// SPDX-License-Identifier: MPL-2.0

//! Burst photo capture pipeline
//!
//! This pipeline turns a burst of raw frames into one fused photo:
//!
//! ```text
//! FrameSource → FrameSink → BurstCoordinator → FusionProcessor → ArtifactSink
//!                                  │                 │
//!                            (one lock)       (blocking worker)
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **Capture**: Frames arrive from a live device or a directory, in any order
//! 2. **Collection**: The coordinator gathers exactly N frames per burst
//! 3. **Fusion**: Decode, align, merge and tone map on a blocking worker
//! 4. **Encoding**: JPEG output plus an optional representative raw frame
//! 5. **Storage**: Artifacts go to the artifact sink, status to the status sink

pub mod burst_mode;
pub mod capture;
pub mod decoding;
pub mod encoding;

pub use burst_mode::burst::{
    BurstCoordinator, BurstProcessor, BurstTicket, CompletedBurst, RawFrame,
};
pub use burst_mode::{BurstModeConfig, BurstModePipeline, PipelineReport};
pub use capture::{FrameSink, FrameSource, LiveFrameSource};
pub use decoding::{DecodeParams, FrameDecoder, RawDecoder};
pub use encoding::PhotoEncoder;

use crate::config::Config;
use crate::errors::{AppError, AppResult, BurstError};
use crate::status::{Status, StatusSink};
use crate::storage::{ArtifactSink, DirectoryArtifactSink, FallbackArtifactSink, StoredArtifacts};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Linear-light RGB image with one f32 per channel
pub type LinearImage = image::Rgb32FImage;

/// Which artifacts a burst produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Fused JPEG only
    #[default]
    EncodedOnly,
    /// Fused JPEG plus the representative raw frame
    EncodedPlusRaw,
}

impl OutputMode {
    pub const ALL: [OutputMode; 2] = [OutputMode::EncodedOnly, OutputMode::EncodedPlusRaw];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::EncodedOnly => "encoded-only",
            OutputMode::EncodedPlusRaw => "encoded-plus-raw",
        }
    }

    pub fn includes_raw(&self) -> bool {
        matches!(self, OutputMode::EncodedPlusRaw)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown output mode '{}' (expected encoded-only or encoded-plus-raw)",
                    s
                )
            })
    }
}

/// Output of one successful pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifacts {
    /// Fused image, lossy compressed
    pub encoded_image: Vec<u8>,
    /// Representative raw frame, verbatim
    pub raw_frame: Option<Arc<[u8]>>,
}

/// A stored burst
#[derive(Debug, Clone)]
pub struct BurstResult {
    pub id: Uuid,
    pub stored: StoredArtifacts,
    pub report: PipelineReport,
}

/// What a burst ticket resolves to
pub type BurstOutcome = AppResult<BurstResult>;

/// Runs the fusion pipeline on completed bursts and stores the result
pub struct FusionProcessor {
    pipeline: BurstModePipeline,
    artifacts: Arc<dyn ArtifactSink>,
    status: Arc<dyn StatusSink>,
}

impl FusionProcessor {
    pub fn new(
        pipeline: BurstModePipeline,
        artifacts: Arc<dyn ArtifactSink>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            pipeline,
            artifacts,
            status,
        }
    }

    /// Pipeline and storage as described by `config`
    pub fn from_config(config: &Config, status: Arc<dyn StatusSink>) -> Self {
        let artifacts = FallbackArtifactSink::new(
            DirectoryArtifactSink::new(config.photo_directory()),
            DirectoryArtifactSink::new(config.fallback_directory()),
        );
        Self::new(
            BurstModePipeline::new(BurstModeConfig::from(config)),
            Arc::new(artifacts),
            status,
        )
    }

    fn fail(&self, err: AppError) -> BurstOutcome {
        self.status.post(&Status::ProcessError(err.to_string()));
        Err(err)
    }
}

impl BurstProcessor for FusionProcessor {
    type Output = BurstOutcome;

    fn process(&self, burst: CompletedBurst) -> BurstOutcome {
        // A panicking decoder must still end in a process error status
        let run = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.pipeline.process(&burst.frames, burst.mode)
        }));
        let run = match run {
            Ok(Ok(run)) => run,
            Ok(Err(e)) => return self.fail(e.into()),
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(id = %burst.id, %detail, "Fusion pipeline panicked");
                return self.fail(BurstError::WorkerFailed(detail).into());
            }
        };

        for (index, reason) in run.report.skipped() {
            self.status.post(&Status::SkippedFrame {
                index,
                reason: reason.to_string(),
            });
        }

        let stem: String = burst.id.simple().to_string().chars().take(8).collect();
        let stored = match self.artifacts.store_artifacts(&run.artifacts, &stem) {
            Ok(stored) => stored,
            Err(e) => return self.fail(e.into()),
        };

        info!(id = %burst.id, photo = %stored.photo.display(), "Burst saved");
        self.status.post(&Status::Saved(burst.mode));
        Ok(BurstResult {
            id: burst.id,
            stored,
            report: run.report,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "pipeline panicked".to_string()
    }
}

/// Request surface: start a burst and get a ticket for its outcome
pub struct BurstCamera<P: BurstProcessor = FusionProcessor> {
    coordinator: Arc<BurstCoordinator<P>>,
    source: Arc<dyn FrameSource>,
    status: Arc<dyn StatusSink>,
}

impl<P: BurstProcessor> BurstCamera<P> {
    pub fn new(
        processor: P,
        source: Arc<dyn FrameSource>,
        status: Arc<dyn StatusSink>,
        runtime: Handle,
    ) -> Self {
        Self {
            coordinator: Arc::new(BurstCoordinator::new(processor, runtime)),
            source,
            status,
        }
    }

    pub fn coordinator(&self) -> &Arc<BurstCoordinator<P>> {
        &self.coordinator
    }

    /// Open a burst of `count` frames and ask the frame source for them
    pub async fn start_burst(
        &self,
        count: usize,
        mode: OutputMode,
    ) -> AppResult<BurstTicket<P::Output>> {
        let ticket = self.coordinator.begin_burst(count, mode)?;
        self.status.post(&Status::Capturing { count });

        let sink = FrameSink::new(self.coordinator.clone(), Arc::clone(&self.status));
        if let Err(e) = self.source.request_burst(count, sink).await {
            warn!(source = self.source.name(), error = %e, "Frame source failed");
            self.coordinator.abort_burst();
            self.status.post(&Status::CaptureError(e.to_string()));
            return Err(e.into());
        }

        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::synthetic::{SyntheticFrame, encode_rgb16_tiff};
    use crate::errors::DecodeError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStatus(Mutex<Vec<String>>);

    impl StatusSink for RecordingStatus {
        fn post(&self, status: &Status) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    struct PanickingDecoder;

    impl FrameDecoder for PanickingDecoder {
        fn decode(&self, _raw: &[u8]) -> Result<LinearImage, DecodeError> {
            panic!("sensor table missing");
        }
    }

    fn burst_of(blobs: Vec<Vec<u8>>, mode: OutputMode) -> CompletedBurst {
        CompletedBurst {
            id: Uuid::new_v4(),
            mode,
            frames: blobs
                .into_iter()
                .enumerate()
                .map(|(arrival, data)| RawFrame {
                    arrival,
                    data: data.into(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_decoder_panic_is_reported_as_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(RecordingStatus::default());
        let processor = FusionProcessor::new(
            BurstModePipeline::default().with_decoder(Arc::new(PanickingDecoder)),
            Arc::new(DirectoryArtifactSink::new(dir.path())),
            status.clone(),
        );

        let outcome = processor.process(burst_of(vec![vec![1, 2, 3]; 2], OutputMode::EncodedOnly));

        assert!(matches!(
            outcome,
            Err(AppError::Burst(BurstError::WorkerFailed(ref detail))) if detail == "sensor table missing"
        ));
        assert_eq!(
            *status.0.lock().unwrap(),
            vec!["process error: Burst error: Processing worker failed: sensor table missing"]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_processor_stores_artifacts_and_posts_saved() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(RecordingStatus::default());
        let processor = FusionProcessor::new(
            BurstModePipeline::default(),
            Arc::new(DirectoryArtifactSink::new(dir.path())),
            status.clone(),
        );
        let blob = encode_rgb16_tiff(&SyntheticFrame::solid(8, 8, 0.4)).unwrap();

        let result = processor
            .process(burst_of(vec![blob.clone(); 3], OutputMode::EncodedPlusRaw))
            .unwrap();

        assert_eq!(result.stored.photo.parent(), Some(dir.path()));
        assert_eq!(std::fs::read(result.stored.raw.unwrap()).unwrap(), blob);
        assert_eq!(*status.0.lock().unwrap(), vec!["saved encoded-plus-raw"]);
    }

    #[test]
    fn test_output_mode_text_forms() {
        for mode in OutputMode::ALL {
            assert_eq!(mode.to_string().parse::<OutputMode>(), Ok(mode));
            assert_eq!(
                serde_json::to_string(&mode).unwrap(),
                format!("\"{}\"", mode)
            );
        }
        assert!("raw-only".parse::<OutputMode>().is_err());
        assert!(OutputMode::EncodedPlusRaw.includes_raw());
        assert!(!OutputMode::EncodedOnly.includes_raw());
    }
}
