#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Retry backoff calculation for staged operations
//!
//! A [`BackoffPolicy`] is pure configuration: exponential delay growth with
//! a jitter band and a ceiling, plus the maximum number of tries per step.
//! The mutable side lives in [`BackoffState`], owned by exactly one
//! operation and reset whenever a step succeeds. Delays are deterministic
//! given a fixed jitter seed, which is what the tests use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Backoff configuration for retrying failed steps
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Exponential growth factor applied per failed try
    pub multiplier: f64,
    /// Jitter band as a fraction of the computed delay (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Ceiling on the computed delay
    pub max_delay: Duration,
    /// Maximum tries per step before the operation fails
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Whether another try is allowed after `failures` failed tries
    #[must_use]
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Create fresh backoff state with entropy-seeded jitter
    #[must_use]
    pub fn state(&self) -> BackoffState {
        BackoffState {
            failures: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create fresh backoff state with a fixed jitter seed.
    ///
    /// Delay sequences are fully deterministic for a given seed.
    #[must_use]
    pub fn state_with_seed(&self, seed: u64) -> BackoffState {
        BackoffState {
            failures: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delay before try number `failures + 1`, jittered and clamped.
    fn delay_for(&self, failures: u32, rng: &mut StdRng) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base = self.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64;
        #[allow(clippy::cast_precision_loss)]
        let ceiling = self.max_delay.as_millis().min(u128::from(u64::MAX)) as f64;

        #[allow(clippy::cast_possible_wrap)]
        let delay = base * self.multiplier.powi(failures.saturating_sub(1) as i32);
        let delay = delay.min(ceiling);

        let jitter = delay * self.jitter_factor * (rng.random::<f64>() - 0.5);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let final_delay = (delay + jitter).max(0.0).round() as u64;

        Duration::from_millis(final_delay)
    }
}

/// Per-step retry bookkeeping owned by one operation.
///
/// Counts failed tries of the current step; reset when a step succeeds so
/// the next step starts from the initial delay again.
#[derive(Debug)]
pub struct BackoffState {
    failures: u32,
    rng: StdRng,
}

impl BackoffState {
    /// Number of failed tries recorded so far
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed try and compute the delay before the next one.
    ///
    /// Returns `None` once the policy's `max_attempts` is reached, meaning
    /// the step must not be re-invoked.
    pub fn next_delay(&mut self, policy: &BackoffPolicy) -> Option<Duration> {
        self.failures += 1;
        if policy.should_retry(self.failures) {
            Some(policy.delay_for(self.failures, &mut self.rng))
        } else {
            None
        }
    }

    /// Reset after a successful try
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
