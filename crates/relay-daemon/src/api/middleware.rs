//! A coarse per-IP request throttle sitting in front of all three intake
//! routes, implemented as `governor`'s keyed limiter rather than a
//! hand-rolled bucket. The same crate backs [`relay_ratelimit::RateLimiter`],
//! just keyed by client IP here instead of unkeyed.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as Governor};

use super::error::ApiError;

/// Tens of requests per second per IP, generous enough not to trip on a
/// legitimate burst of status polls but tight enough to bound abuse.
pub const DEFAULT_PER_IP_BURST: u32 = 20;
pub const DEFAULT_PER_IP_REFILL_PER_SEC: u32 = 20;

pub type IpLimiter = Governor<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

pub fn new_ip_limiter(burst: u32, refill_per_sec: u32) -> Arc<IpLimiter> {
    let burst = NonZeroU32::new(burst).expect("per-IP rate limit burst must be nonzero");
    let rate = NonZeroU32::new(refill_per_sec).expect("per-IP rate limit rate must be nonzero");
    Arc::new(Governor::keyed(Quota::per_second(rate).allow_burst(burst)))
}

pub async fn per_ip_rate_limit(
    State(limiter): State<Arc<IpLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.check_key(&addr.ip()).is_err() {
        return ApiError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    next.run(request).await
}
