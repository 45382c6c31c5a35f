pub mod lock;
pub mod rate_limiter;

pub use lock::SessionLock;
pub use rate_limiter::{RateDecision, RateLimitConfig, SessionRateLimiter};
