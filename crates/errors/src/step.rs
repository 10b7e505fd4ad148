//! Step-level error types and failure classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure taxonomy consumed by the retry engine.
///
/// Each step classifies its own domain failures into one of these kinds;
/// the engine only needs to know whether to retry, abort, or short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Likely to succeed on retry (e.g. transient network error)
    Transient,
    /// Aborts the whole operation immediately
    Fatal,
    /// A required condition was not met (e.g. insufficient disk space)
    PreconditionFailed,
    /// The step did not complete within its deadline
    Timeout,
    /// Cancellation was requested by the caller
    Cancelled,
}

/// Errors produced by individual steps of a staged operation
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum StepError {
    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("fatal failure: {message}")]
    Fatal { message: String },

    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("step timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl StepError {
    /// Create a transient (retryable) failure
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
        }
    }

    /// Create a fatal failure
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal {
            message: msg.into(),
        }
    }

    /// Create a precondition failure
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: msg.into(),
        }
    }

    /// Classification of this failure
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::Transient,
            Self::Fatal { .. } => FailureKind::Fatal,
            Self::PreconditionFailed { .. } => FailureKind::PreconditionFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }

    /// Whether the engine should retry the step that produced this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Transient)
    }
}
