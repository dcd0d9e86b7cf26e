//! Exponential backoff with an elapsed-time budget.
//!
//! The credential refresh loop is the only internal retry loop in this
//! crate. Its policy is time-budgeted rather than attempt-counted: delays
//! grow geometrically, and once the total elapsed time since the first
//! failure exceeds the budget the policy signals stop.

use crate::core::config::AuthConfig;
use crate::core::time::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Geometric retry delays bounded by total elapsed time.
pub struct ExponentialBackoff {
    clock: Arc<dyn Clock>,
    started_ms: Option<u64>,
    current: Duration,
    multiplier: f64,
    max_elapsed: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started_ms: None,
            current: Duration::from_millis(config.backoff_initial_ms),
            multiplier: config.backoff_multiplier,
            max_elapsed: Duration::from_millis(config.backoff_max_elapsed_ms),
        }
    }

    /// The delay to sleep before the next attempt, or `None` once the
    /// elapsed budget (measured from the first call) is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let now = self.clock.now_ms();
        let started = *self.started_ms.get_or_insert(now);
        if now.saturating_sub(started) >= self.max_elapsed.as_millis() as u64 {
            return None;
        }
        let delay = self.current;
        self.current = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        Some(delay)
    }
}
