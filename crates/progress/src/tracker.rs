//! Single-writer status cell with throttled event emission

use crate::utils;
use stagehand_errors::FailureKind;
use stagehand_events::{EventEmitter, EventSender};
use stagehand_types::{OperationKey, OperationState, OperationStatus};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum interval between byte-level progress emissions.
///
/// State transitions always emit; only the high-frequency byte updates
/// inside a step are throttled.
const BYTE_EMIT_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks and reports progress for a single staged operation.
///
/// Clones share one status cell. Mutations after the terminal transition
/// are ignored, which is what makes a late step callback harmless.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    tx: EventSender,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    status: OperationStatus,
    started_at: Instant,
    last_byte_emit: Option<Instant>,
}

impl ProgressTracker {
    /// Create a tracker in the `Queued` state
    #[must_use]
    pub fn new(key: OperationKey, tx: EventSender) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                tx,
                state: Mutex::new(TrackerState {
                    status: OperationStatus::queued(key),
                    started_at: Instant::now(),
                    last_byte_emit: None,
                }),
            }),
        }
    }

    /// Snapshot of the current status
    ///
    /// # Panics
    ///
    /// Panics if the status lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> OperationStatus {
        self.inner.state.lock().unwrap().status.clone()
    }

    /// Transition `Queued -> InProgress`. No-op in any other state.
    pub fn start(&self) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state != OperationState::Queued {
                return;
            }
            state.status.state = OperationState::InProgress;
            state.started_at = Instant::now();
            state.status.clone()
        };
        self.emit_update(&snapshot);
    }

    /// Record that a step began executing
    pub fn step_started(&self, name: &str) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state.is_terminal() {
                return;
            }
            state.status.current_step = Some(name.to_string());
            state.status.attempts = 0;
            state.status.clone()
        };
        self.emit_update(&snapshot);
    }

    /// Record a failed try of the current step
    pub fn retrying(&self, failures: u32) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state.is_terminal() {
                return;
            }
            state.status.attempts = failures;
            state.status.clone()
        };
        self.emit_update(&snapshot);
    }

    /// Set the expected total once it is known
    pub fn set_total(&self, total: u64) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state.is_terminal() {
                return;
            }
            state.status.bytes_total = Some(total.max(state.status.bytes_done));
            state.status.clone()
        };
        self.emit_update(&snapshot);
    }

    /// Add processed bytes. Monotonic and clamped to the known total.
    ///
    /// Emission is throttled; the terminal transition always emits the
    /// final counters, so no progress is ever lost to the throttle.
    pub fn add_bytes(&self, bytes: u64) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state.is_terminal() {
                return;
            }
            let mut done = state.status.bytes_done.saturating_add(bytes);
            if let Some(total) = state.status.bytes_total {
                done = done.min(total);
            }
            state.status.bytes_done = done;

            let now = Instant::now();
            let due = state
                .last_byte_emit
                .is_none_or(|last| now.duration_since(last) >= BYTE_EMIT_INTERVAL);
            if !due {
                return;
            }
            state.last_byte_emit = Some(now);
            state.status.clone()
        };
        self.emit_update(&snapshot);
    }

    /// Perform the terminal transition.
    ///
    /// First writer wins: returns the terminal snapshot only to the caller
    /// that actually performed the transition, `None` to everyone else.
    /// The winner is responsible for reporting completion exactly once.
    pub fn finish(
        &self,
        terminal: OperationState,
        error: Option<(FailureKind, String)>,
    ) -> Option<OperationStatus> {
        debug_assert!(terminal.is_terminal());
        let (snapshot, elapsed) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status.state.is_terminal() {
                return None;
            }
            state.status.state = terminal;
            if let Some((kind, message)) = error {
                state.status.error = Some(kind);
                state.status.message = Some(message);
            }
            (state.status.clone(), state.started_at.elapsed())
        };

        self.emit_update(&snapshot);
        self.inner.tx.emit_debug(format!(
            "operation {} reached {:?} after {} ({})",
            snapshot.key,
            snapshot.state,
            utils::format_duration(elapsed),
            utils::format_bytes(snapshot.bytes_done),
        ));
        Some(snapshot)
    }

    fn emit_update(&self, status: &OperationStatus) {
        self.inner.tx.emit_progress_updated(
            status.key.clone(),
            status.bytes_done,
            status.bytes_total,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_events::{channel, AppEvent, ProgressEvent};

    fn tracker() -> (ProgressTracker, stagehand_events::EventReceiver) {
        let (tx, rx) = channel();
        (ProgressTracker::new(OperationKey::from("test"), tx), rx)
    }

    #[tokio::test]
    async fn bytes_are_monotonic_and_clamped() {
        let (tracker, _rx) = tracker();
        tracker.start();
        tracker.set_total(100);

        tracker.add_bytes(60);
        assert_eq!(tracker.snapshot().bytes_done, 60);

        tracker.add_bytes(60);
        // Clamped to the total, never beyond
        assert_eq!(tracker.snapshot().bytes_done, 100);
        assert_eq!(tracker.snapshot().bytes_total, Some(100));
    }

    #[tokio::test]
    async fn start_only_leaves_queued() {
        let (tracker, _rx) = tracker();
        assert_eq!(tracker.snapshot().state, OperationState::Queued);

        tracker.start();
        assert_eq!(tracker.snapshot().state, OperationState::InProgress);

        tracker.finish(OperationState::Success, None);
        tracker.start();
        assert_eq!(tracker.snapshot().state, OperationState::Success);
    }

    #[tokio::test]
    async fn finish_is_first_writer_wins() {
        let (tracker, _rx) = tracker();
        tracker.start();

        let won = tracker.finish(
            OperationState::Cancelled,
            Some((FailureKind::Cancelled, "cancelled".to_string())),
        );
        assert!(won.is_some());
        assert_eq!(won.unwrap().state, OperationState::Cancelled);

        // The losing finisher gets nothing and changes nothing
        assert!(tracker.finish(OperationState::Success, None).is_none());
        assert_eq!(tracker.snapshot().state, OperationState::Cancelled);
        assert_eq!(tracker.snapshot().error, Some(FailureKind::Cancelled));
    }

    #[tokio::test]
    async fn no_updates_after_terminal() {
        let (tracker, mut rx) = tracker();
        tracker.start();
        tracker.finish(OperationState::Cancelled, None);

        while rx.try_recv().is_ok() {}

        tracker.add_bytes(10);
        tracker.step_started("late");
        tracker.set_total(1000);
        tracker.retrying(1);

        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.snapshot().bytes_done, 0);
        assert!(tracker.snapshot().current_step.is_none());
    }

    #[tokio::test]
    async fn emitted_byte_counts_never_decrease() {
        let (tracker, mut rx) = tracker();
        tracker.start();
        tracker.set_total(1000);
        for _ in 0..20 {
            tracker.add_bytes(37);
        }
        tracker.finish(OperationState::Success, None);

        let mut last = 0;
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Progress(ProgressEvent::Updated { bytes_done, .. }) = event {
                assert!(bytes_done >= last);
                last = bytes_done;
            }
        }
        assert_eq!(last, 740);
    }

    #[tokio::test]
    async fn step_started_resets_attempts() {
        let (tracker, _rx) = tracker();
        tracker.start();
        tracker.step_started("fetch");
        tracker.retrying(2);
        assert_eq!(tracker.snapshot().attempts, 2);

        tracker.step_started("store");
        let status = tracker.snapshot();
        assert_eq!(status.attempts, 0);
        assert_eq!(status.current_step.as_deref(), Some("store"));
    }
}
