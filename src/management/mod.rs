mod auth;
mod flow;
mod ratelimit;

pub use auth::RefreshCoordinator;
pub use auth::TokenManager;
pub use flow::AUTH_SESSION_TTL_SECS;
pub use flow::AuthFlow;
pub use flow::AuthState;
pub use ratelimit::FixedWindowLimiter;
pub use ratelimit::RateLimiter;
