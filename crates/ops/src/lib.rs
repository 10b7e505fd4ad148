#![deny(clippy::pedantic, unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc // Mutex::lock panics only on poisoning
)]

//! Staged operation orchestration for stagehand
//!
//! This crate ties the pieces together: a [`Step`] sequence runs under an
//! [`OperationRegistry`] that enforces at most one
//! in-flight operation per key, retries transient step failures with
//! backoff, reports progress through the event channel, and honors
//! cooperative cancellation at every suspension point.
//!
//! ```no_run
//! use stagehand_config::OrchestratorConfig;
//! use stagehand_ops::{OperationRegistry, Step, StepResult};
//!
//! # async fn example() -> stagehand_errors::Result<()> {
//! let (tx, _rx) = stagehand_events::channel();
//! let registry = OperationRegistry::new(OrchestratorConfig::default(), tx);
//!
//! let handle = registry.start(
//!     "file:A",
//!     vec![
//!         Step::new("compute-size", |cx| async move {
//!             cx.progress().set_total(1024);
//!             StepResult::Continue
//!         }),
//!         Step::new("copy", |cx| async move {
//!             cx.progress().add_bytes(1024);
//!             StepResult::Done
//!         }),
//!     ],
//! )?;
//!
//! let _status = handle.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
mod operation;
pub mod registry;
pub mod step;

pub use cancel::CancellationToken;
pub use registry::{OperationHandle, OperationRegistry};
pub use step::{Step, StepContext, StepResult};
