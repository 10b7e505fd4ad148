//! The staged operation engine
//!
//! Runs a step sequence strictly sequentially on one control task. The
//! cancellation token is consulted before every step invocation, while a
//! step is in flight, and before every retry re-invocation, so cancellation
//! always wins over retry scheduling. A step result arriving after the
//! terminal transition is discarded by the tracker's first-writer-wins
//! `finish`.

use crate::cancel::CancellationToken;
use crate::step::{Step, StepContext, StepResult};
use stagehand_backoff::BackoffPolicy;
use stagehand_errors::{Error, FailureKind, StepError};
use stagehand_events::{EventEmitter, EventSender, OperationEvent};
use stagehand_progress::ProgressTracker;
use stagehand_types::{OperationKey, OperationState, OperationStatus};
use std::time::Duration;

pub(crate) struct StagedOperation {
    key: OperationKey,
    steps: Vec<Step>,
    policy: BackoffPolicy,
    step_timeout: Duration,
    tracker: ProgressTracker,
    token: CancellationToken,
    tx: EventSender,
}

impl StagedOperation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: OperationKey,
        steps: Vec<Step>,
        policy: BackoffPolicy,
        step_timeout: Duration,
        tracker: ProgressTracker,
        token: CancellationToken,
        tx: EventSender,
    ) -> Self {
        Self {
            key,
            steps,
            policy,
            step_timeout,
            tracker,
            token,
            tx,
        }
    }

    /// Run all steps to a terminal state.
    ///
    /// Returns the terminal snapshot if this task performed the terminal
    /// transition; `None` when someone else (a synchronous cancel) already
    /// did, in which case the caller must not report completion again.
    pub(crate) async fn run(self) -> Option<OperationStatus> {
        if self.token.is_cancelled() {
            return self.finish_cancelled();
        }

        self.tracker.start();
        self.tx.emit_operation(OperationEvent::Started {
            key: self.key.clone(),
            steps: self.steps.len(),
        });

        for (index, step) in self.steps.iter().enumerate() {
            let mut backoff = self.policy.state();

            loop {
                if self.token.is_cancelled() {
                    return self.finish_cancelled();
                }

                self.tracker.step_started(step.name());
                self.tx.emit_operation(OperationEvent::StepStarted {
                    key: self.key.clone(),
                    step: step.name().to_string(),
                    index,
                });

                let context = StepContext::new(self.token.clone(), self.tracker.clone());
                let action = step.invoke(context);

                let outcome = tokio::select! {
                    () = self.token.cancelled() => return self.finish_cancelled(),
                    outcome = tokio::time::timeout(self.step_timeout, action) => outcome,
                };
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => StepResult::Fail(
                        StepError::Timeout {
                            seconds: self.step_timeout.as_secs(),
                        }
                        .into(),
                    ),
                };

                // A result that raced with cancellation is discarded.
                if self.token.is_cancelled() {
                    return self.finish_cancelled();
                }

                match result {
                    StepResult::Continue => break,
                    StepResult::Done => return self.finish_success(),
                    StepResult::Fail(Error::Cancelled) => return self.finish_cancelled(),
                    StepResult::Fail(error) => return self.finish_error(&error),
                    StepResult::Retry { reason } => {
                        let Some(delay) = backoff.next_delay(&self.policy) else {
                            let error: Error = StepError::transient(reason).into();
                            return self.finish_error(&error);
                        };

                        self.tracker.retrying(backoff.failures());
                        self.tx.emit_operation(OperationEvent::StepRetrying {
                            key: self.key.clone(),
                            step: step.name().to_string(),
                            attempt: backoff.failures(),
                            delay,
                        });

                        tokio::select! {
                            () = self.token.cancelled() => return self.finish_cancelled(),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        self.finish_success()
    }

    fn finish_success(&self) -> Option<OperationStatus> {
        let status = self.tracker.finish(OperationState::Success, None)?;
        self.tx.emit_operation(OperationEvent::Completed {
            key: self.key.clone(),
            status: status.clone(),
        });
        Some(status)
    }

    fn finish_error(&self, error: &Error) -> Option<OperationStatus> {
        let status = self.tracker.finish(
            OperationState::Error,
            Some((error.failure_kind(), error.to_string())),
        )?;
        self.tx.emit_operation(OperationEvent::Failed {
            key: self.key.clone(),
            status: status.clone(),
        });
        Some(status)
    }

    fn finish_cancelled(&self) -> Option<OperationStatus> {
        let status = self.tracker.finish(
            OperationState::Cancelled,
            Some((FailureKind::Cancelled, Error::Cancelled.to_string())),
        )?;
        self.tx.emit_operation(OperationEvent::Cancelled {
            key: self.key.clone(),
            status: status.clone(),
        });
        Some(status)
    }
}
