pub mod app;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{Authenticator, Principal, RateLimitConfig, RateLimiter};
pub use domain::{Anime, Filters, Metadata, Permission};
pub use infra::Config;
pub use storage::{Models, StoreError};
