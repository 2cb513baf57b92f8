//! Per-engine token-bucket rate limiting.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};
use tracing::trace;

use crate::EngineOptions;

/// Token bucket refilling one token per `interval`, up to `burst` tokens.
///
/// `acquire` waits for a token instead of rejecting the caller.
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
    interval: Duration,
    burst: u32,
}

impl RateLimiter {
    /// Creates a limiter. A zero interval or burst is raised to the minimum
    /// of one millisecond and one token.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            inner: DefaultDirectRateLimiter::direct(quota),
            interval,
            burst: burst.get(),
        }
    }

    /// Builds the limiter described by an engine's options.
    pub fn from_options(options: &EngineOptions) -> Self {
        Self::new(options.rate_interval(), options.rate_burst)
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        if self.inner.check().is_ok() {
            return;
        }
        trace!(interval = ?self.interval, "Rate limit reached, waiting for a token");
        self.inner.until_ready().await;
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .field("burst", &self.burst)
            .finish()
    }
}
