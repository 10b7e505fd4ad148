//! Configuration error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("invalid config: {message}")]
    ParseFailed { message: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
