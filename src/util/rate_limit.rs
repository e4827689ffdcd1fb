//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified events per second
pub fn create_limiter(events_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(events_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Inbound sync frame limit per remote peer. Twice the simulation rate:
/// a well-behaved peer sends at most one frame per object per tick.
pub const SYNC_RATE_LIMIT: u32 = 120;

/// Per-peer limiter for inbound datagrams
#[derive(Clone)]
pub struct PeerRateLimiter {
    sync_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self {
            sync_limiter: create_limiter(SYNC_RATE_LIMIT),
        }
    }

    /// Check if an inbound sync frame is allowed (returns true if allowed)
    pub fn check_sync(&self) -> bool {
        self.sync_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
