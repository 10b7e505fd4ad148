//! Step model: the state machine as data
//!
//! A staged operation is a sequence of named [`Step`]s. Each step is an
//! asynchronous action from the operation context to a [`StepResult`],
//! replacing nested continuation chains with an explicit tagged result.

use crate::cancel::CancellationToken;
use futures::future::BoxFuture;
use stagehand_errors::Error;
use stagehand_progress::ProgressTracker;

/// Outcome of one step invocation
#[derive(Debug)]
pub enum StepResult {
    /// Advance to the next step in the sequence
    Continue,
    /// Re-invoke the same step after a backoff delay
    Retry { reason: String },
    /// Abort the whole operation
    Fail(Error),
    /// Finish the operation successfully, skipping any remaining steps
    Done,
}

impl StepResult {
    /// Create a retry result with a reason
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    /// Classify an error into retry-or-fail using its own taxonomy.
    ///
    /// Transient errors become `Retry`, everything else aborts.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        if error.is_retryable() {
            Self::Retry {
                reason: error.to_string(),
            }
        } else {
            Self::Fail(error)
        }
    }
}

/// Context handed to each step invocation.
///
/// Carries a cancellation view for long-running actions and the progress
/// tracker for byte/item accounting. Cheap to clone into spawned work.
#[derive(Clone)]
pub struct StepContext {
    token: CancellationToken,
    progress: ProgressTracker,
}

impl StepContext {
    pub(crate) fn new(token: CancellationToken, progress: ProgressTracker) -> Self {
        Self { token, progress }
    }

    /// Whether the operation has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the operation is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Progress tracker for this operation
    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }
}

type StepAction = dyn Fn(StepContext) -> BoxFuture<'static, StepResult> + Send + Sync;

/// One named asynchronous unit of work within a staged operation
pub struct Step {
    name: String,
    action: Box<StepAction>,
}

impl Step {
    /// Create a step from an async closure
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StepResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(move |cx| -> BoxFuture<'static, StepResult> {
                Box::pin(action(cx))
            }),
        }
    }

    /// Name used in progress reporting and events
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, cx: StepContext) -> BoxFuture<'static, StepResult> {
        (self.action)(cx)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}
