#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the stagehand orchestrator
//!
//! This crate provides fine-grained error types organized by domain.
//! Step-level failures carry a retry classification consumed by the
//! operation engine; registry-level failures never need one.

use thiserror::Error;

pub mod config;
pub mod operation;
pub mod step;

// Re-export all error types at the root
pub use config::ConfigError;
pub use operation::OperationError;
pub use step::{FailureKind, StepError};

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum Error {
    #[error("operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("step error: {0}")]
    Step(#[from] StepError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the failed step is likely to succeed.
    ///
    /// Only transient step failures are retried; everything else aborts
    /// the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Step(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Coarse failure classification recorded in terminal operation status.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Step(err) => err.kind(),
            Self::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Fatal,
        }
    }
}

/// Result type alias for stagehand operations
pub type Result<T> = std::result::Result<T, Error>;
