//! Domain event types emitted by the orchestrator

use crate::meta::{EventLevel, EventMeta, EventSource};
use serde::{Deserialize, Serialize};
use stagehand_types::{OperationKey, OperationStatus};
use std::time::Duration;

/// Top-level event type carried on the event channel.
///
/// Events are grouped by functional domain; every variant can produce the
/// [`EventMeta`] used for correlation and log routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    Operation(OperationEvent),
    Progress(ProgressEvent),
    General(GeneralEvent),
}

impl AppEvent {
    /// Severity of this event
    #[must_use]
    pub fn level(&self) -> EventLevel {
        match self {
            Self::Operation(event) => event.level(),
            Self::Progress(_) => EventLevel::Debug,
            Self::General(event) => event.level(),
        }
    }

    /// Subsystem that originated this event
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            Self::Operation(_) => EventSource::OPERATION,
            Self::Progress(_) => EventSource::PROGRESS,
            Self::General(_) => EventSource::GENERAL,
        }
    }

    /// Operation key this event relates to, if any
    #[must_use]
    pub fn operation_key(&self) -> Option<&OperationKey> {
        match self {
            Self::Operation(event) => Some(event.key()),
            Self::Progress(ProgressEvent::Updated { key, .. }) => Some(key),
            Self::General(_) => None,
        }
    }

    /// Build the structured metadata for this event
    #[must_use]
    pub fn meta(&self) -> EventMeta {
        let meta = EventMeta::new(self.level(), self.source());
        match self.operation_key() {
            Some(key) => meta.with_correlation_id(key.to_string()),
            None => meta,
        }
    }

    /// Route this event into the tracing subscriber at its own level.
    pub fn log(&self) {
        let source = self.source();
        let source = source.as_str();
        match self.level() {
            EventLevel::Trace => tracing::trace!(source, "{self:?}"),
            EventLevel::Debug => tracing::debug!(source, "{self:?}"),
            EventLevel::Info => tracing::info!(source, "{self:?}"),
            EventLevel::Warn => tracing::warn!(source, "{self:?}"),
            EventLevel::Error => tracing::error!(source, "{self:?}"),
        }
    }
}

/// Lifecycle events of staged operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationEvent {
    /// Steps have started executing
    Started { key: OperationKey, steps: usize },
    /// A step began (or re-began after a retry)
    StepStarted {
        key: OperationKey,
        step: String,
        index: usize,
    },
    /// A step failed transiently and will be re-invoked after a delay
    StepRetrying {
        key: OperationKey,
        step: String,
        attempt: u32,
        delay: Duration,
    },
    /// Terminal: all steps completed
    Completed {
        key: OperationKey,
        status: OperationStatus,
    },
    /// Terminal: a step failed fatally or exhausted retries
    Failed {
        key: OperationKey,
        status: OperationStatus,
    },
    /// Terminal: cancellation was requested
    Cancelled {
        key: OperationKey,
        status: OperationStatus,
    },
}

impl OperationEvent {
    /// Key of the operation this event belongs to
    #[must_use]
    pub fn key(&self) -> &OperationKey {
        match self {
            Self::Started { key, .. }
            | Self::StepStarted { key, .. }
            | Self::StepRetrying { key, .. }
            | Self::Completed { key, .. }
            | Self::Failed { key, .. }
            | Self::Cancelled { key, .. } => key,
        }
    }

    /// Whether this is a terminal event
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    fn level(&self) -> EventLevel {
        match self {
            Self::Started { .. } | Self::StepStarted { .. } | Self::Completed { .. } => {
                EventLevel::Info
            }
            Self::StepRetrying { .. } | Self::Cancelled { .. } => EventLevel::Warn,
            Self::Failed { .. } => EventLevel::Error,
        }
    }
}

/// Byte/item progress updates within an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    Updated {
        key: OperationKey,
        bytes_done: u64,
        bytes_total: Option<u64>,
    },
}

impl ProgressEvent {
    /// Create an update event from current counters
    #[must_use]
    pub fn updated(key: OperationKey, bytes_done: u64, bytes_total: Option<u64>) -> Self {
        Self::Updated {
            key,
            bytes_done,
            bytes_total,
        }
    }
}

/// Free-form diagnostic messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GeneralEvent {
    DebugLog { message: String },
    Warning { message: String },
    Error { message: String },
}

impl GeneralEvent {
    /// Create a debug log event
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
        }
    }

    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    fn level(&self) -> EventLevel {
        match self {
            Self::DebugLog { .. } => EventLevel::Debug,
            Self::Warning { .. } => EventLevel::Warn,
            Self::Error { .. } => EventLevel::Error,
        }
    }
}
