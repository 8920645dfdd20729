use crate::app::{Authenticator, Notifier, RateLimiter};
use crate::domain::{Anime, Metadata, User};
use crate::infra::Config;
use crate::storage::Models;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub models: Models,
    pub authenticator: Authenticator,
    pub rate_limiter: Arc<RateLimiter>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        models: Models,
        rate_limiter: Arc<RateLimiter>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        let authenticator = Authenticator::new(models.users.clone(), models.permissions.clone());
        Self {
            models,
            authenticator,
            rate_limiter,
            notifier,
            config,
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAnimeRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    /// Minutes.
    #[serde(default)]
    pub runtime: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateAnimeRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAuthenticationTokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AnimeEnvelope {
    pub anime: Anime,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AnimeListEnvelope {
    pub animes: Vec<Anime>,
    pub metadata: Metadata,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct MessageEnvelope {
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct UserEnvelope {
    pub user: User,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AuthenticationTokenEnvelope {
    pub authentication_token: IssuedToken,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub system_info: SystemInfo,
}

/// Shape of every error body. `error` is a string, or a field -> message map
/// for failed validation.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorEnvelope {
    #[schema(value_type = Object)]
    pub error: serde_json::Value,
}
