//! Per-catalog rate limiter
//!
//! Tracks the earliest instant the next request may start. Waiting is a
//! `tokio::time::sleep`, never a busy loop.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Rate limiter for a single catalog client
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between requests
    min_delay: Duration,
    /// Extra delay added after the catalog answered 429
    backoff: Duration,
    /// Maximum backoff delay
    max_backoff: Duration,
    /// Earliest start of the next request
    next_allowed: Option<Instant>,
    /// Consecutive rate limit hits
    consecutive_429s: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_REQUEST_DELAY)
    }
}

impl RateLimiter {
    /// Create a rate limiter enforcing `min_delay` between requests
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(60),
            next_allowed: None,
            consecutive_429s: 0,
        }
    }

    /// Wait until the next request is allowed, then reserve the slot after it
    pub async fn wait(&mut self) {
        if let Some(next) = self.next_allowed {
            let now = Instant::now();
            if next > now {
                let wait_time = next - now;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.next_allowed = Some(Instant::now() + self.min_delay + self.backoff);
    }

    /// Handle a successful request
    pub fn on_success(&mut self) {
        self.backoff = Duration::ZERO;
        self.consecutive_429s = 0;
    }

    /// Handle a rate limit (HTTP 429) response
    pub fn on_rate_limit(&mut self) {
        self.consecutive_429s += 1;
        self.backoff = (self.backoff * 2)
            .max(Duration::from_secs(1))
            .min(self.max_backoff);
        if let Some(next) = self.next_allowed.as_mut() {
            *next = (*next).max(Instant::now() + self.backoff);
        }
    }

    /// Get the current backoff duration
    pub fn current_backoff(&self) -> Duration {
        self.backoff
    }

    /// Configured minimum delay between requests
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Number of 429 responses in a row
    pub fn consecutive_rate_limits(&self) -> u32 {
        self.consecutive_429s
    }
}
