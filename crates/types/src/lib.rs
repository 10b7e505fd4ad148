#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core data types for the stagehand orchestrator
//!
//! Plain data shared across crates: operation keys, lifecycle states and
//! status snapshots. Status values are mutated only by the owning
//! operation; everything a caller sees is a snapshot.

mod key;
mod status;

pub use key::{OperationId, OperationKey};
pub use status::{OperationState, OperationStatus};
