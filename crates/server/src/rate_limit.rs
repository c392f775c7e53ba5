//! Per-client-IP rate limiting: create 30/min, upload 10/min, regenerate
//! 5/min.
//!
//! Built on `governor`, applied here at the one crate that owns an HTTP
//! surface. Each limited route checks its own keyed limiter at the top of
//! the handler rather than through a blanket `tower::Layer`, since each
//! route carries a distinct quota.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;

pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

pub fn per_minute(count: u32) -> Arc<IpRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(count).expect("rate limit count must be nonzero"));
    Arc::new(RateLimiter::keyed(quota))
}
