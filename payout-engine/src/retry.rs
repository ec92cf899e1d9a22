//! Retry backoff policy for failed payouts
//!
//! The state machine owns the retry *count* (on the payout record);
//! this module owns the *spacing*. Delays grow exponentially and are
//! capped, so a flapping gateway cannot be hammered.

use std::time::Duration;

/// Backoff configuration for payout retries
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 300_000, // 5 minutes
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// `attempt == 0` means no failure yet and yields zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(base.min(self.max_delay_ms as f64) as u64)
    }
}
