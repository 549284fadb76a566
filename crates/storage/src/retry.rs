//! Conflict backoff for read-write transactions
//!
//! A transaction that loses commit validation is re-run from scratch. Before
//! re-run `n` the runner waits `base * 2^n`, capped at `max`. The wait never
//! outlives the caller's [`Context`]: cancellation wakes it early, and a
//! deadline that falls inside the backoff fails it up front.

use keystone_core::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep inside [`RetryConfig::wait`]
const WAKE_INTERVAL: Duration = Duration::from_millis(5);

/// How often and how patiently conflicting transactions are re-run
///
/// Loaded from the `[retry]` table of `keystone.toml`:
///
/// ```toml
/// [retry]
/// max_retries = 5
/// base_delay_ms = 10
/// max_delay_ms = 200
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-runs after the first attempt; 0 surfaces the first conflict
    pub max_retries: usize,
    /// Backoff before the first re-run, in milliseconds
    pub base_delay_ms: u64,
    /// Cap on any single backoff, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RetryConfig {
    /// Default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface the first conflict to the caller
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Up to `max_retries` re-runs back to back
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Replace the number of re-runs
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Back off from `base`, doubling per re-run up to `max`
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = millis(base);
        self.max_delay_ms = millis(max);
        self
    }

    /// Reject a cap below the base delay
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::invalid_input(
                "retry.max_delay_ms must be >= base_delay_ms",
            ));
        }
        Ok(())
    }

    /// Backoff before re-run number `attempt` (0-based)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63) as u32;
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Sleep out the backoff before re-run `attempt`
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` as soon as `ctx` is cancelled, and
    /// `DeadlineExceeded` without sleeping if the deadline falls inside the
    /// backoff.
    pub fn wait(&self, ctx: &Context, attempt: usize) -> Result<()> {
        ctx.check()?;
        let until = Instant::now() + self.backoff(attempt);
        if matches!(ctx.deadline(), Some(deadline) if deadline < until) {
            return Err(Error::DeadlineExceeded);
        }
        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep((until - now).min(WAKE_INTERVAL));
            ctx.check()?;
        }
    }
}
