//! Rate limiter for Kalshi API reads.
//!
//! Basic tier allows 20 reads/sec.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create with Kalshi basic-tier limits.
    pub fn new() -> Self {
        Self::with_limit(20)
    }

    /// Create with a custom per-second read limit. Zero is treated as one.
    pub fn with_limit(reads_per_sec: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(reads_per_sec).unwrap_or(NonZeroU32::MIN));
        Self {
            read_limiter: Arc::new(GovLimiter::direct(quota)),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Try to acquire a read slot without waiting. Returns true if acquired.
    pub fn try_read(&self) -> bool {
        self.read_limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
