//! Reconnect policy and backoff calculation.
//!
//! Portable, sync-only building blocks; the connection driver in
//! `galley-realtime` owns the timers.
//!
//! - [`ReconnectPolicy`]: base delay, cap, jitter window, attempt budget
//! - [`RetryState`]: per-connection attempt counter
//! - [`backoff_delay_ms`]: the deterministic exponential part

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum (capped) delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default attempt budget before the connection surfaces as `Error`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default upper bound of the uniform jitter added to every delay.
pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

/// Reconnect backoff configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry (default: 1000).
    pub base_delay_ms: u64,
    /// Cap for the exponential part (default: 30000).
    pub max_delay_ms: u64,
    /// Attempts allowed before giving up (default: 10).
    pub max_attempts: u32,
    /// Jitter is drawn uniformly from `0..=max_jitter_ms` (default: 1000).
    pub max_jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Check the policy for values that would make backoff meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base reconnect delay must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max reconnect delay must be >= base delay".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max reconnect attempts must be > 0".to_string());
        }
        Ok(())
    }

    /// Delay for a one-based `attempt` with an explicit jitter value.
    ///
    /// `jitter_ms` is clamped to `max_jitter_ms`.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let base = backoff_delay_ms(attempt, self.base_delay_ms, self.max_delay_ms);
        Duration::from_millis(base.saturating_add(jitter_ms.min(self.max_jitter_ms)))
    }

    /// Delay for a one-based `attempt` with random jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.max_jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential part of the backoff: `min(base * 2^(attempt-1), max)`.
///
/// `attempt` is one-based; `0` is treated as `1`.
#[must_use]
pub fn backoff_delay_ms(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// RetryState
// ─────────────────────────────────────────────────────────────────────────────

/// Attempt counter for one connection.
///
/// Reset on every successful open, incremented on every failed attempt or
/// unexpected close.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts since the last successful open.
    pub attempt: u32,
    /// Delay chosen for the pending retry.
    pub next_delay_ms: Option<u64>,
}

impl RetryState {
    /// Record a failure and pick the next delay.
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn record_failure(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > policy.max_attempts {
            self.next_delay_ms = None;
            return None;
        }
        let delay = policy.delay(self.attempt);
        #[allow(clippy::cast_possible_truncation)]
        let ms = delay.as_millis() as u64;
        self.next_delay_ms = Some(ms);
        Some(delay)
    }

    /// Back to zero after a successful open or an explicit restart.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the budget is spent.
    #[must_use]
    pub fn is_exhausted(&self, policy: &ReconnectPolicy) -> bool {
        self.attempt > policy.max_attempts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            max_jitter_ms: 0,
            ..ReconnectPolicy::default()
        }
    }

    // -- ReconnectPolicy --

    #[test]
    fn policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.max_jitter_ms, 1000);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn policy_serde_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str(r#"{"maxAttempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
    }

    #[test]
    fn policy_rejects_inverted_bounds() {
        let policy = ReconnectPolicy {
            base_delay_ms: 5000,
            max_delay_ms: 1000,
            ..ReconnectPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    // -- backoff_delay_ms --

    #[test]
    fn backoff_doubles_from_base() {
        assert_eq!(backoff_delay_ms(1, 1000, 30_000), 1000);
        assert_eq!(backoff_delay_ms(2, 1000, 30_000), 2000);
        assert_eq!(backoff_delay_ms(3, 1000, 30_000), 4000);
        assert_eq!(backoff_delay_ms(4, 1000, 30_000), 8000);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(backoff_delay_ms(6, 1000, 30_000), 30_000);
        assert_eq!(backoff_delay_ms(200, 1000, 30_000), 30_000);
    }

    #[test]
    fn backoff_attempt_zero_is_base() {
        assert_eq!(backoff_delay_ms(0, 1000, 30_000), 1000);
    }

    #[test]
    fn jitter_stays_in_window() {
        let policy = ReconnectPolicy::default();
        for _ in 0..100 {
            let d = policy.delay(1).as_millis();
            assert!((1000..=2000).contains(&d), "delay {d} outside window");
        }
    }

    #[test]
    fn explicit_jitter_is_clamped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.delay_with_jitter(1, 50_000),
            Duration::from_millis(2000)
        );
    }

    // -- RetryState --

    #[test]
    fn retry_state_counts_and_exhausts() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..no_jitter()
        };
        let mut retry = RetryState::default();
        assert_eq!(retry.record_failure(&policy), Some(Duration::from_millis(1000)));
        assert_eq!(retry.record_failure(&policy), Some(Duration::from_millis(2000)));
        assert_eq!(retry.record_failure(&policy), None);
        assert!(retry.is_exhausted(&policy));
        assert_eq!(retry.attempt, 3);
    }

    #[test]
    fn retry_state_reset_returns_to_base() {
        let policy = no_jitter();
        let mut retry = RetryState::default();
        let _ = retry.record_failure(&policy);
        let _ = retry.record_failure(&policy);
        retry.reset();
        assert_eq!(retry.attempt, 0);
        assert_eq!(retry.record_failure(&policy), Some(Duration::from_millis(1000)));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_up_to_cap(
            base in 1u64..5_000,
            cap_factor in 1u64..64,
            attempt in 1u32..40,
        ) {
            let cap = base * cap_factor;
            let here = backoff_delay_ms(attempt, base, cap);
            let next = backoff_delay_ms(attempt + 1, base, cap);
            prop_assert!(next >= here);
            prop_assert!(here <= cap);
            prop_assert!(here >= base.min(cap));
        }
    }
}
