//! Retry policy for delivery attempts within one sampling cycle.
//!
//! Each cycle gets a fixed attempt budget with a constant delay between
//! attempts. There is deliberately no backoff: the next cycle is seconds
//! away anyway, and a driver's position goes stale faster than a backoff
//! curve pays off.

use std::time::Duration;

use crate::config::TrackingConfig;

/// Attempt budget and spacing for one cycle's delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct SendRetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    /// Delay between attempts.
    delay: Duration,
}

impl SendRetryPolicy {
    /// Creates a policy with a fixed attempt budget.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    /// * `delay` - Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Builds the policy from the tracking configuration.
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::fixed(config.max_retry_attempts, config.retry_delay)
    }

    /// Calculates the delay before the next attempt.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt number that just failed (1-based)
    ///
    /// # Returns
    ///
    /// The delay to wait before retrying, or `None` if the budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.max_attempts {
            Some(self.delay)
        } else {
            None
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
