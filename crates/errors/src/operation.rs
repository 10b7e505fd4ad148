//! Operation registry and lifecycle error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum OperationError {
    #[error("operation already running for key: {key}")]
    AlreadyRunning { key: String },

    #[error("operation has no steps")]
    EmptyOperation,

    #[error("registry is shut down")]
    Shutdown,

    #[error("operation was dropped before completing")]
    Abandoned,
}
