pub mod error;
pub mod middleware;
pub mod router;
pub mod types;
pub mod handlers {
    pub mod animes;
    pub mod common;
    pub mod health;
    pub mod tokens;
    pub mod users;
}

pub use error::{ApiError, ApiResult};
pub use router::{create_router, docs, routes, with_pipeline, ApiDoc};
pub use types::AppState;
