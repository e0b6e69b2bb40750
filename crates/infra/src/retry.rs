//! Retry policy for optimistic-concurrency conflicts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use stockledger_core::InventoryError;

use crate::store::StoreError;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^attempt
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Calculate delay after a given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_for_attempt_seeded(attempt, 0)
    }

    /// Like [`Self::delay_for_attempt`], with the jitter offset by a per-caller `seed`
    /// so contending writers spread out instead of waking together.
    pub fn delay_for_attempt_seeded(&self, attempt: u32, seed: u64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1).min(30) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic jitter based on attempt and seed
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let bucket = (u64::from(attempt) * 17).wrapping_add(seed % 100) % 100;
            let pseudo_random = bucket as f64 / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Check if another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Outcome of one attempt inside [`retry_on_conflict`].
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Lost an optimistic-concurrency race; the whole attempt is re-run.
    Conflict(String),
    Failed(InventoryError),
}

impl From<InventoryError> for AttemptError {
    fn from(value: InventoryError) -> Self {
        AttemptError::Failed(value)
    }
}

impl From<StoreError> for AttemptError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => AttemptError::Conflict(msg),
            other => AttemptError::Failed(other.into()),
        }
    }
}

/// Run `attempt` until it succeeds, fails for a non-conflict reason, or the policy
/// is exhausted (`ConcurrencyConflict`).
pub(crate) fn retry_on_conflict<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: impl FnMut() -> Result<T, AttemptError>,
) -> Result<T, InventoryError> {
    let seed = caller_seed();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(AttemptError::Failed(err)) => return Err(err),
            Err(AttemptError::Conflict(reason)) => {
                if !policy.should_retry(attempts) {
                    return Err(InventoryError::conflict(operation, attempts));
                }
                let delay = policy.delay_for_attempt_seeded(attempts, seed);
                debug!(operation, attempts, ?delay, %reason, "retrying after concurrency conflict");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Per-thread jitter seed.
fn caller_seed() -> u64 {
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
