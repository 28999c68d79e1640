//! Value rate limiting for consumers of status changes.
//!
//! Both limiters run as a tokio task that owns its timer. The handle feeds
//! the task; dropping the handle (or calling `cancel`) ends the task and
//! discards whatever emission was still pending.

mod debounce;
mod throttle;

pub use debounce::Debouncer;
pub use throttle::Throttler;

use std::time::Duration;

use scanwatch_config::{RateLimitKind, ViewConfig};

/// How view change notifications are paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// Every change is forwarded as it happens.
    Immediate,
    Debounce(Duration),
    Throttle(Duration),
}

impl RateLimit {
    pub fn from_config(config: &ViewConfig) -> Self {
        let delay = config.rate_limit_delay();
        match config.rate_limit() {
            RateLimitKind::Immediate => RateLimit::Immediate,
            RateLimitKind::Debounce => RateLimit::Debounce(delay),
            RateLimitKind::Throttle => RateLimit::Throttle(delay),
        }
    }
}
