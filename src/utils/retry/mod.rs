//! Retry configuration with exponential backoff, cap, and jitter.
//!
//! Used by `ResilientConnection` for statements that may fail transiently
//! (lock wait timeouts, deadlocks, dropped sessions).

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Default total attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default ceiling for a single backoff wait.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default growth factor between consecutive waits.
pub const DEFAULT_FACTOR: f32 = 2.0;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the initial one.
    /// Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub factor: f32,
    /// Randomize each delay to avoid many migrations retrying in lockstep.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            factor: DEFAULT_FACTOR,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fast, deterministic retries for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 1,
            factor: 1.0,
            jitter: false,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms))
    }

    /// Effective attempt ceiling (never zero).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Number of waits between attempts.
    pub fn retries(&self) -> u32 {
        self.attempts() - 1
    }

    /// Build the backoff schedule.
    ///
    /// The resulting iterator yields exactly `retries()` delays: one per retry.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay())
            .with_max_delay(self.max_delay())
            .with_factor(self.factor.max(1.0))
            .with_max_times(self.retries() as usize);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
