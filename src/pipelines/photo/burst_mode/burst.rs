// SPDX-License-Identifier: GPL-3.0-only
//! Burst session coordination
//!
//! Frames of a burst arrive from independent capture completions, in any
//! order and possibly from several threads at once. The coordinator collects
//! them into one [`BurstSession`] behind a single lock and, the moment the
//! last frame lands, hands the complete set to a [`BurstProcessor`] on a
//! blocking worker:
//!
//! ```text
//! begin_burst(N) ──▶ Collecting ──submit_frame × N──▶ Ready ──▶ Draining ──▶ Idle
//!                         │                                        │
//!                    abort_burst                          spawn_blocking(process)
//!                         ▼                                        ▼
//!                       Idle                               ticket resolves
//! ```
//!
//! The lock only covers the append-and-check. Processing never runs on the
//! thread that submitted the final frame.

use crate::errors::BurstError;
use crate::pipelines::photo::OutputMode;
use futures::channel::oneshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One raw container blob as it arrived
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Position in arrival order within its burst
    pub arrival: usize,
    pub data: Arc<[u8]>,
}

/// A full burst handed over for processing
#[derive(Debug)]
pub struct CompletedBurst {
    pub id: Uuid,
    pub mode: OutputMode,
    /// Exactly the collected frames, in arrival order
    pub frames: Vec<RawFrame>,
}

/// Work run once per completed burst
pub trait BurstProcessor: Send + Sync + 'static {
    type Output: Send + 'static;

    fn process(&self, burst: CompletedBurst) -> Self::Output;
}

/// Anything frames can be submitted to
pub trait FrameReceiver: Send + Sync {
    fn submit_frame(&self, data: Vec<u8>) -> Result<SubmitOutcome, BurstError>;
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Collecting,
    /// All frames present (only observable inside the lock)
    Ready,
    /// Frames being handed to the processor (only observable inside the lock)
    Draining,
}

type Completion<T> = oneshot::Sender<Result<T, BurstError>>;

/// The single burst a coordinator is collecting
struct BurstSession<T> {
    id: Uuid,
    expected_count: usize,
    mode: OutputMode,
    collected: Vec<RawFrame>,
    state: SessionState,
    completion: Option<Completion<T>>,
}

impl<T> BurstSession<T> {
    fn idle() -> Self {
        Self {
            id: Uuid::nil(),
            expected_count: 0,
            mode: OutputMode::default(),
            collected: Vec::new(),
            state: SessionState::Idle,
            completion: None,
        }
    }

    /// Take the frames and completion, leaving an idle session behind
    fn drain(&mut self) -> (CompletedBurst, Option<Completion<T>>) {
        self.state = SessionState::Draining;
        let burst = CompletedBurst {
            id: self.id,
            mode: self.mode,
            frames: std::mem::take(&mut self.collected),
        };
        let completion = self.completion.take();
        *self = Self::idle();
        (burst, completion)
    }
}

/// Result of one `submit_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Frame stored, burst still incomplete
    Collecting { collected: usize, expected: usize },
    /// Frame completed the burst and processing was dispatched
    Dispatched { id: Uuid },
}

/// Resolves with the processor output of one burst
#[derive(Debug)]
pub struct BurstTicket<T> {
    id: Uuid,
    expected_count: usize,
    receiver: oneshot::Receiver<Result<T, BurstError>>,
}

impl<T> BurstTicket<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Wait for the burst to be processed
    pub async fn wait(self) -> Result<T, BurstError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(BurstError::WorkerFailed(
                "processing stopped without a result".into(),
            )),
        }
    }
}

/// Collects frames and triggers processing exactly once per burst
pub struct BurstCoordinator<P: BurstProcessor> {
    session: Mutex<BurstSession<P::Output>>,
    processor: Arc<P>,
    runtime: Handle,
}

impl<P: BurstProcessor> BurstCoordinator<P> {
    /// `runtime` is where processing is dispatched (`spawn_blocking`)
    pub fn new(processor: P, runtime: Handle) -> Self {
        Self {
            session: Mutex::new(BurstSession::idle()),
            processor: Arc::new(processor),
            runtime,
        }
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    fn lock_session(&self) -> MutexGuard<'_, BurstSession<P::Output>> {
        // Session data stays consistent even if a holder panicked
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new burst of `expected_count` frames
    ///
    /// Rejected while another burst is still collecting.
    pub fn begin_burst(
        &self,
        expected_count: usize,
        mode: OutputMode,
    ) -> Result<BurstTicket<P::Output>, BurstError> {
        if expected_count == 0 {
            return Err(BurstError::InvalidFrameCount(expected_count));
        }

        let mut session = self.lock_session();
        if session.state == SessionState::Collecting {
            let err = BurstError::SessionActive {
                collected: session.collected.len(),
                expected: session.expected_count,
            };
            warn!(error = %err, "Rejecting overlapping burst");
            return Err(err);
        }

        let (sender, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        *session = BurstSession {
            id,
            expected_count,
            mode,
            collected: Vec::with_capacity(expected_count),
            state: SessionState::Collecting,
            completion: Some(sender),
        };

        info!(%id, expected_count, %mode, "Burst session opened");
        Ok(BurstTicket {
            id,
            expected_count,
            receiver,
        })
    }

    /// Discard a partially collected burst
    ///
    /// Returns the number of frames dropped, or `None` if nothing was collecting.
    /// The burst's ticket resolves to [`BurstError::Abandoned`].
    pub fn abort_burst(&self) -> Option<usize> {
        let mut session = self.lock_session();
        if session.state != SessionState::Collecting {
            return None;
        }
        let (burst, completion) = session.drain();
        drop(session);

        warn!(id = %burst.id, dropped = burst.frames.len(), "Burst abandoned");
        if let Some(completion) = completion {
            let _ = completion.send(Err(BurstError::Abandoned));
        }
        Some(burst.frames.len())
    }

    pub fn is_collecting(&self) -> bool {
        self.lock_session().state == SessionState::Collecting
    }

    pub fn collected_count(&self) -> usize {
        self.lock_session().collected.len()
    }

    fn dispatch(&self, burst: CompletedBurst, completion: Option<Completion<P::Output>>) {
        let processor = Arc::clone(&self.processor);
        let id = burst.id;
        info!(%id, frames = burst.frames.len(), "Burst complete, dispatching");

        self.runtime.spawn_blocking(move || {
            let start = std::time::Instant::now();
            let output = processor.process(burst);
            info!(%id, elapsed_ms = start.elapsed().as_millis(), "Burst processed");

            if let Some(completion) = completion
                && completion.send(Ok(output)).is_err()
            {
                debug!(%id, "Burst ticket dropped before completion");
            }
        });
    }
}

impl<P: BurstProcessor> FrameReceiver for BurstCoordinator<P> {
    fn submit_frame(&self, data: Vec<u8>) -> Result<SubmitOutcome, BurstError> {
        let mut session = self.lock_session();
        if session.state != SessionState::Collecting {
            warn!(bytes = data.len(), "Dropping frame, no burst is collecting");
            return Err(BurstError::NoActiveBurst);
        }

        let arrival = session.collected.len();
        session.collected.push(RawFrame {
            arrival,
            data: data.into(),
        });

        let collected = session.collected.len();
        let expected = session.expected_count;
        if collected < expected {
            debug!(collected, expected, "Frame collected");
            return Ok(SubmitOutcome::Collecting {
                collected,
                expected,
            });
        }

        session.state = SessionState::Ready;
        let (burst, completion) = session.drain();
        drop(session);

        let id = burst.id;
        self.dispatch(burst, completion);
        Ok(SubmitOutcome::Dispatched { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every burst it is asked to process
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<Vec<u8>>>>,
    }

    impl BurstProcessor for Recorder {
        type Output = Vec<Vec<u8>>;

        fn process(&self, burst: CompletedBurst) -> Self::Output {
            let frames: Vec<Vec<u8>> = burst.frames.iter().map(|f| f.data.to_vec()).collect();
            self.calls.lock().unwrap().push(frames.clone());
            frames
        }
    }

    fn coordinator() -> BurstCoordinator<Recorder> {
        BurstCoordinator::new(Recorder::default(), Handle::current())
    }

    #[tokio::test]
    async fn test_triggers_once_with_all_frames() {
        for n in 1..=8usize {
            let coordinator = coordinator();
            let ticket = coordinator.begin_burst(n, OutputMode::EncodedOnly).unwrap();
            assert_eq!(ticket.expected_count(), n);

            for i in 0..n - 1 {
                let outcome = coordinator.submit_frame(vec![i as u8]).unwrap();
                assert_eq!(
                    outcome,
                    SubmitOutcome::Collecting {
                        collected: i + 1,
                        expected: n
                    }
                );
            }
            assert!(coordinator.processor().calls.lock().unwrap().is_empty());

            let outcome = coordinator.submit_frame(vec![(n - 1) as u8]).unwrap();
            assert_eq!(outcome, SubmitOutcome::Dispatched { id: ticket.id() });

            let frames = ticket.wait().await.unwrap();
            let expected: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8]).collect();
            assert_eq!(frames, expected);
            assert_eq!(coordinator.processor().calls.lock().unwrap().len(), 1);
            assert!(!coordinator.is_collecting());
        }
    }

    #[tokio::test]
    async fn test_overlapping_burst_is_rejected() {
        let coordinator = coordinator();
        let _ticket = coordinator.begin_burst(3, OutputMode::EncodedOnly).unwrap();
        coordinator.submit_frame(vec![1]).unwrap();

        let err = coordinator
            .begin_burst(2, OutputMode::EncodedPlusRaw)
            .unwrap_err();
        assert_eq!(
            err,
            BurstError::SessionActive {
                collected: 1,
                expected: 3
            }
        );
        // The first burst kept its frame
        assert_eq!(coordinator.collected_count(), 1);
    }

    #[tokio::test]
    async fn test_abort_resolves_ticket() {
        let coordinator = coordinator();
        let ticket = coordinator.begin_burst(4, OutputMode::EncodedOnly).unwrap();
        coordinator.submit_frame(vec![1]).unwrap();
        coordinator.submit_frame(vec![2]).unwrap();

        assert_eq!(coordinator.abort_burst(), Some(2));
        assert_eq!(ticket.wait().await.unwrap_err(), BurstError::Abandoned);
        assert_eq!(coordinator.abort_burst(), None);
        assert!(coordinator.processor().calls.lock().unwrap().is_empty());

        // A fresh burst can start right away
        assert!(coordinator.begin_burst(1, OutputMode::EncodedOnly).is_ok());
    }

    #[tokio::test]
    async fn test_frames_without_session_are_rejected() {
        let coordinator = coordinator();
        assert_eq!(
            coordinator.submit_frame(vec![0]).unwrap_err(),
            BurstError::NoActiveBurst
        );
        assert_eq!(
            coordinator
                .begin_burst(0, OutputMode::EncodedOnly)
                .unwrap_err(),
            BurstError::InvalidFrameCount(0)
        );
    }
}
