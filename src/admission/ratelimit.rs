//! Per-sender fixed-window throttle.

use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{SharedKvStore, StoreError};
use crate::telemetry::counters;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Window length, anchored at the first message of the window
    pub window: Duration,
    /// Messages admitted per window (inclusive)
    pub max_messages: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            max_messages: 50,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self { window, max_messages }
    }
}

/// Outcome of one throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Within budget; `count` is this message's position in the window.
    Admitted { count: i64 },
    /// Over budget. The increment still stands.
    Rejected { count: i64 },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    pub fn count(&self) -> i64 {
        match self {
            Self::Admitted { count } | Self::Rejected { count } => *count,
        }
    }
}

/// Fixed-window counter per sender.
///
/// Every check increments the counter, rejected ones included, and the
/// counter is never rolled back. The expiry is armed only when the counter
/// is created, so the window starts at the sender's first message and is not
/// calendar aligned. A burst at the end of one window followed by a burst at
/// the start of the next can admit up to twice the ceiling in a short span.
#[derive(Clone)]
pub struct RateLimiter {
    kv: SharedKvStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(kv: SharedKvStore, config: RateLimitConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn store_name(&self) -> &'static str {
        self.kv.name()
    }

    fn key(sender: &str) -> String {
        format!("limit:{}", sender)
    }

    /// Count one message for `sender` and decide whether it fits the window.
    pub async fn try_admit(&self, sender: &str) -> Result<RateDecision, StoreError> {
        let count = self
            .kv
            .incr_with_expiry(&Self::key(sender), self.config.window)
            .await?;

        if count > i64::from(self.config.max_messages) {
            warn!(
                sender = %sender,
                count,
                limit = self.config.max_messages,
                "rate limit exceeded"
            );
            counters::rate_limit_denied();
            return Ok(RateDecision::Rejected { count });
        }

        debug!(sender = %sender, count, "rate limit check passed");
        counters::rate_limit_allowed();
        Ok(RateDecision::Admitted { count })
    }
}
