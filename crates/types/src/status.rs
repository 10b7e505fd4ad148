//! Operation lifecycle state and status snapshots

use crate::OperationKey;
use serde::{Deserialize, Serialize};
use stagehand_errors::FailureKind;

/// Lifecycle state of a staged operation.
///
/// Transitions are monotonic: `Queued -> InProgress -> terminal`. There is
/// no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Registered, waiting for a run permit
    Queued,
    /// Steps are executing
    InProgress,
    /// All steps completed
    Success,
    /// A step failed fatally or exhausted its retries
    Error,
    /// Cancellation was requested before completion
    Cancelled,
}

impl OperationState {
    /// Whether no further transition can occur from this state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

/// Point-in-time snapshot of an operation's progress.
///
/// Readers only ever see copies of this; the tracker owning the live value
/// is the single writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatus {
    /// Key the operation is registered under
    pub key: OperationKey,
    /// Current lifecycle state
    pub state: OperationState,
    /// Bytes (or items) processed so far; never decreases
    pub bytes_done: u64,
    /// Total bytes expected, once known
    pub bytes_total: Option<u64>,
    /// Name of the step currently executing
    pub current_step: Option<String>,
    /// Failed tries of the current step
    pub attempts: u32,
    /// Failure classification, populated for `Error` and `Cancelled`
    pub error: Option<FailureKind>,
    /// Human-readable failure message
    pub message: Option<String>,
}

impl OperationStatus {
    /// Create a fresh queued status for a key
    #[must_use]
    pub fn queued(key: OperationKey) -> Self {
        Self {
            key,
            state: OperationState::Queued,
            bytes_done: 0,
            bytes_total: None,
            current_step: None,
            attempts: 0,
            error: None,
            message: None,
        }
    }

    /// Completion percentage, available once the total is known
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> Option<f64> {
        self.bytes_total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_done as f64 / total as f64) * 100.0
            }
        })
    }
}
