// SPDX-License-Identifier: MPL-2.0

//! Frame acquisition for bursts
//!
//! A [`FrameSource`] produces the raw blobs of one burst and pushes each of
//! them through a [`FrameSink`]. Whether the blobs come from a live device or
//! from files on disk, they enter the coordinator through the same path.

use super::burst_mode::burst::{FrameReceiver, SubmitOutcome};
use crate::backends::CaptureDevice;
use crate::errors::SourceError;
use crate::status::{Status, StatusSink};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Delivery path from a frame source into the burst coordinator
#[derive(Clone)]
pub struct FrameSink {
    receiver: Arc<dyn FrameReceiver>,
    status: Arc<dyn StatusSink>,
}

impl FrameSink {
    pub fn new(receiver: Arc<dyn FrameReceiver>, status: Arc<dyn StatusSink>) -> Self {
        Self { receiver, status }
    }

    /// Hand one capture result to the coordinator
    ///
    /// Capture failures are reported as status and do not count toward the burst.
    pub fn deliver(&self, frame: Result<Vec<u8>, SourceError>) {
        match frame {
            Ok(data) => match self.receiver.submit_frame(data) {
                Ok(SubmitOutcome::Collecting {
                    collected,
                    expected,
                }) => debug!(collected, expected, "Frame delivered"),
                Ok(SubmitOutcome::Dispatched { id }) => {
                    debug!(%id, "Final frame delivered")
                }
                Err(e) => warn!(error = %e, "Frame rejected by coordinator"),
            },
            Err(e) => {
                warn!(error = %e, "Frame capture failed");
                self.status.post(&Status::CaptureError(e.to_string()));
            }
        }
    }
}

/// Supplies the raw frames of a burst
pub trait FrameSource: Send + Sync {
    fn name(&self) -> &str;

    /// Start producing `count` frames into `sink`
    ///
    /// Resolves once the request has been issued. Frames may keep arriving
    /// after that.
    fn request_burst(&self, count: usize, sink: FrameSink) -> BoxFuture<'_, Result<(), SourceError>>;
}

/// Captures each frame of a burst as an independent task on the runtime
///
/// Completions reach the sink in whatever order the device finishes them.
pub struct LiveFrameSource<D: CaptureDevice> {
    device: Arc<D>,
}

impl<D: CaptureDevice> LiveFrameSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(device),
        }
    }
}

impl<D: CaptureDevice> FrameSource for LiveFrameSource<D> {
    fn name(&self) -> &str {
        self.device.name()
    }

    fn request_burst(&self, count: usize, sink: FrameSink) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            info!(device = self.device.name(), count, "Requesting live burst");
            for index in 0..count {
                let device = Arc::clone(&self.device);
                let sink = sink.clone();
                tokio::spawn(async move {
                    let frame = device.capture_frame(index).await;
                    sink.deliver(frame);
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BurstError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl FrameReceiver for Collector {
        fn submit_frame(&self, data: Vec<u8>) -> Result<SubmitOutcome, BurstError> {
            let mut frames = self.frames.lock().unwrap();
            frames.push(data);
            Ok(SubmitOutcome::Collecting {
                collected: frames.len(),
                expected: usize::MAX,
            })
        }
    }

    #[derive(Default)]
    struct Statuses(Mutex<Vec<String>>);

    impl StatusSink for Statuses {
        fn post(&self, status: &Status) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    #[test]
    fn test_capture_error_is_reported_not_submitted() {
        let collector = Arc::new(Collector::default());
        let statuses = Arc::new(Statuses::default());
        let sink = FrameSink::new(collector.clone(), statuses.clone());

        sink.deliver(Ok(vec![1, 2, 3]));
        sink.deliver(Err(SourceError::Device("sensor timeout".into())));

        assert_eq!(collector.frames.lock().unwrap().len(), 1);
        assert_eq!(
            *statuses.0.lock().unwrap(),
            vec!["capture error: sensor timeout".to_string()]
        );
    }
}
