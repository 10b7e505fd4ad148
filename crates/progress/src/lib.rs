#![deny(clippy::pedantic, unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc // Mutex::lock panics only on poisoning
)]

//! Progress tracking and reporting for staged operations
//!
//! A [`ProgressTracker`] owns the live `OperationStatus` for one operation
//! and is its single writer. Byte counters are monotonic and clamped to the
//! known total; the terminal transition is first-writer-wins, so completion
//! is observable exactly once no matter how many contexts race to finish.
//! Updates are emitted on the event channel: one per state transition,
//! plus byte-level updates throttled to avoid flooding consumers.

mod tracker;

pub use tracker::ProgressTracker;

/// Common progress formatting utilities
pub mod utils {
    use std::time::Duration;

    /// Format bytes with appropriate units
    #[must_use]
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        const THRESHOLD: f64 = 1024.0;

        if bytes == 0 {
            return "0 B".to_string();
        }

        #[allow(clippy::cast_precision_loss)]
        let bytes_f = bytes as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let unit_index = (bytes_f.log10() / THRESHOLD.log10()) as usize;
        let unit_index = unit_index.min(UNITS.len() - 1);

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let value = bytes_f / THRESHOLD.powi(unit_index as i32);

        if unit_index == 0 {
            format!("{bytes} B")
        } else {
            format!("{value:.1} {}", UNITS[unit_index])
        }
    }

    /// Format duration in human-readable form
    #[must_use]
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();

        if total_seconds < 60 {
            format!("{total_seconds}s")
        } else if total_seconds < 3600 {
            let minutes = total_seconds / 60;
            let seconds = total_seconds % 60;
            format!("{minutes}m {seconds}s")
        } else {
            let hours = total_seconds / 3600;
            let minutes = (total_seconds % 3600) / 60;
            format!("{hours}h {minutes}m")
        }
    }

}
