// SPDX-License-Identifier: GPL-3.0-only

//! Human-readable progress reporting
//!
//! The burst pipeline reports what it is doing as short status strings. Where
//! they end up (a log, a UI label, a test) is decided by the [`StatusSink`]
//! implementation handed to it.

use crate::pipelines::photo::OutputMode;
use futures::channel::mpsc;
use std::fmt;
use tracing::info;

/// A status update emitted by the burst camera
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// A burst was requested and capture is starting
    Capturing { count: usize },
    /// One frame could not be captured
    CaptureError(String),
    /// One frame was dropped from fusion (decode failure)
    SkippedFrame { index: usize, reason: String },
    /// The fused artifacts were stored
    Saved(OutputMode),
    /// The run failed
    ProcessError(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Capturing { count } => write!(f, "capturing burst of size {}", count),
            Status::CaptureError(detail) => write!(f, "capture error: {}", detail),
            Status::SkippedFrame { index, reason } => {
                write!(f, "skipped frame {}: {}", index, reason)
            }
            Status::Saved(mode) => write!(f, "saved {}", mode),
            Status::ProcessError(detail) => write!(f, "process error: {}", detail),
        }
    }
}

/// Receives status updates
pub trait StatusSink: Send + Sync {
    fn post(&self, status: &Status);
}

/// Writes statuses to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn post(&self, status: &Status) {
        info!(status = %status, "Burst status");
    }
}

/// Forwards status strings over a channel to whichever task consumes them
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelStatusSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }
}

impl StatusSink for ChannelStatusSink {
    fn post(&self, status: &Status) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.unbounded_send(status.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        assert_eq!(
            Status::Capturing { count: 6 }.to_string(),
            "capturing burst of size 6"
        );
        assert_eq!(
            Status::Saved(OutputMode::EncodedPlusRaw).to_string(),
            "saved encoded-plus-raw"
        );
        assert_eq!(
            Status::CaptureError("sensor timeout".into()).to_string(),
            "capture error: sensor timeout"
        );
        assert!(
            Status::ProcessError("no decodable frames".into())
                .to_string()
                .starts_with("process error: ")
        );
    }

    #[test]
    fn test_channel_sink_forwards_strings() {
        let (sink, mut receiver) = ChannelStatusSink::new();
        sink.post(&Status::Capturing { count: 2 });
        sink.post(&Status::Saved(OutputMode::EncodedOnly));

        assert_eq!(receiver.try_recv().unwrap(), "capturing burst of size 2");
        assert_eq!(receiver.try_recv().unwrap(), "saved encoded-only");
        assert!(receiver.try_recv().is_err());

        // Posting after the receiver is gone is silently ignored
        drop(receiver);
        sink.post(&Status::CaptureError("late".into()));
    }

    #[test]
    fn test_log_sink_is_usable_as_status_sink() {
        let sink: std::sync::Arc<dyn StatusSink> = std::sync::Arc::new(LogStatusSink);
        sink.post(&Status::SkippedFrame {
            index: 1,
            reason: "empty raw container".into(),
        });
    }
}
