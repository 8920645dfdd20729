pub mod auth;
pub mod notifier;
pub mod rate_limiter;

pub use auth::{authorize, AuthError, AuthenticatedUser, Authenticator, Principal};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use rate_limiter::{RateLimitConfig, RateLimitExceeded, RateLimiter};
