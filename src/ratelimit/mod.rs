//! Rate limiting logic and state management.

mod counter;
mod limiter;

pub use counter::{Decision, RateWindow};
pub use limiter::{LimitConfig, RateLimiter, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS};
