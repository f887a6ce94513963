//! A process-wide token bucket gating calls to the upstream attestation API.
//!
//! The upstream imposes a multi-minute lockout somewhere past ~35 requests
//! per second; this bucket keeps the orchestrator under a configurable
//! safety margin (default 30/s sustained, burst 30) regardless of how many
//! jobs the poller is juggling concurrently.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as Governor};

type Clock = governor::clock::DefaultClock;
type Inner = Governor<governor::state::NotKeyed, governor::state::InMemoryState, Clock>;

/// Default burst capacity and sustained refill rate, both 30/s: a safety
/// margin under the ~35/s ceiling that triggers the upstream's lockout.
pub const DEFAULT_BURST: u32 = 30;
pub const DEFAULT_REFILL_PER_SEC: u32 = 30;

/// RateLimiter is the async `Acquire()` gate described by the design: tokens
/// refill lazily (no background timer task) at `refill_per_sec` per second,
/// up to a cap of `burst` tokens. Cloning shares the same underlying bucket,
/// so one instance can be handed to every poller task.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    /// Builds a limiter with burst capacity `burst` and refill rate
    /// `refill_per_sec` tokens/second.
    ///
    /// # Panics
    /// Panics if either argument is zero; a rate limiter that never admits
    /// anything is a configuration error, not a runtime condition to recover
    /// from.
    pub fn new(burst: u32, refill_per_sec: u32) -> Self {
        let burst = NonZeroU32::new(burst).expect("rate limiter burst must be nonzero");
        let rate = NonZeroU32::new(refill_per_sec).expect("rate limiter rate must be nonzero");
        let quota = Quota::per_second(rate).allow_burst(burst);
        Self {
            inner: Arc::new(Governor::direct(quota)),
        }
    }

    /// Builds a limiter using the default 30/s burst and refill rate.
    pub fn default_margin() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_REFILL_PER_SEC)
    }

    /// Consumes one token, sleeping first if none is currently available.
    /// Safe to call concurrently from any number of tasks.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_throttles() {
        let limiter = RateLimiter::new(2, 1);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Both burst tokens were available immediately.
        assert!(start.elapsed() < Duration::from_millis(50));

        // The third call must wait for a refill at ~1 token/sec.
        let third = tokio::time::timeout(Duration::from_millis(200), limiter.acquire()).await;
        assert!(third.is_err(), "third acquire should not be immediate");
    }

    #[tokio::test]
    async fn is_cheaply_cloneable_and_shares_state() {
        let a = RateLimiter::new(1, 1000);
        let b = a.clone();
        a.acquire().await;
        // `b` sees the same bucket as `a`, so a second immediate acquire on
        // `b` should still succeed quickly given the high refill rate.
        let res = tokio::time::timeout(Duration::from_millis(50), b.acquire()).await;
        assert!(res.is_ok());
    }
}
