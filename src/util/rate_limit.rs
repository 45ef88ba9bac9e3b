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

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max UI messages per second from one player
pub const UI_RATE_LIMIT: u32 = 10;

/// Max trigger events per second from one player
pub const TRIGGER_RATE_LIMIT: u32 = 30;

/// Per-player rate limiter state
#[derive(Clone)]
pub struct PlayerRateLimiter {
    ui_limiter: Arc<Limiter>,
    trigger_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self {
            ui_limiter: create_limiter(UI_RATE_LIMIT),
            trigger_limiter: create_limiter(TRIGGER_RATE_LIMIT),
        }
    }

    /// Check if a UI message is allowed (returns true if allowed)
    pub fn check_ui(&self) -> bool {
        self.ui_limiter.check().is_ok()
    }

    pub fn check_trigger(&self) -> bool {
        self.trigger_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
