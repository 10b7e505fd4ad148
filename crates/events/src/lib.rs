#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in stagehand
//!
//! All observable output of the orchestrator flows through events: progress
//! updates, retry notices and terminal outcomes are emitted on an unbounded
//! channel and mirrored into `tracing` at emission time. Consumers that
//! want the spec-level `OnProgress` callback simply drain the receiver.

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{AppEvent, GeneralEvent, OperationEvent, ProgressEvent};

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout the orchestrator.
///
/// Provides a single, consistent API for emitting events regardless of
/// whether you have a raw `EventSender` or a struct that contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter.
    ///
    /// The event is logged via `tracing` at its own level before being put
    /// on the channel. Send errors are ignored - a dropped receiver means
    /// nobody is listening, not that the operation should stop.
    fn emit(&self, event: AppEvent) {
        event.log();
        if let Some(sender) = self.event_sender() {
            let _ = sender.send(event);
        }
    }

    /// Emit a debug log event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    /// Emit an operation lifecycle event
    fn emit_operation(&self, event: OperationEvent) {
        self.emit(AppEvent::Operation(event));
    }

    /// Emit a progress update event
    fn emit_progress_updated(
        &self,
        key: stagehand_types::OperationKey,
        bytes_done: u64,
        bytes_total: Option<u64>,
    ) {
        self.emit(AppEvent::Progress(ProgressEvent::updated(
            key,
            bytes_done,
            bytes_total,
        )));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}
