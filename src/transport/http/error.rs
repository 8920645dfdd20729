//! HTTP error mapping.
//!
//! Every failure a handler or middleware can produce ends up as an
//! [`ApiError`], rendered as `{"error": ...}`. Expected outcomes carry their
//! message to the client verbatim. Backend failures are logged in full and
//! reduced to a generic message.

use crate::app::{AuthError, RateLimitExceeded};
use crate::domain::ValidationErrors;
use crate::storage::StoreError;
use axum::extract::rejection::JsonRejection;
use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::BTreeMap;

pub type ApiResult<T> = Result<T, ApiError>;

pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("body must not be larger than 1048576 bytes")]
    PayloadTooLarge,
    #[error("failed validation")]
    FailedValidation(BTreeMap<String, String>),
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("the record has been modified since version {expected}; reload it and try again")]
    VersionMismatch { expected: i32 },
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    /// Detail is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

impl ApiError {
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        ApiError::Internal(detail.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::EditConflict | ApiError::VersionMismatch { .. } => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json!({ "error": INTERNAL_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        match self {
            ApiError::RateLimitExceeded => {
                headers.insert(RETRY_AFTER, HeaderValue::from_static("1"));
            }
            ApiError::InvalidAuthenticationToken => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::FailedValidation(errors.0)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => ApiError::FailedValidation(
                ValidationErrors::single("email", "a user with this email address already exists").0,
            ),
            StoreError::InvalidFilters(errors) => errors.into(),
            StoreError::Timeout(_) | StoreError::Database(_) => ApiError::internal(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredential => ApiError::InvalidAuthenticationToken,
            AuthError::Unauthenticated => ApiError::AuthenticationRequired,
            AuthError::InactiveAccount => ApiError::InactiveAccount,
            AuthError::Forbidden => ApiError::NotPermitted,
            AuthError::Store(store) => store.into(),
        }
    }
}

impl From<RateLimitExceeded> for ApiError {
    fn from(_: RateLimitExceeded) -> Self {
        ApiError::RateLimitExceeded
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                ApiError::BadRequest(format!("body contains invalid JSON: {}", e.body_text()))
            }
            JsonRejection::JsonSyntaxError(e) => {
                ApiError::BadRequest(format!("body contains badly-formed JSON: {}", e.body_text()))
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::BadRequest("Content-Type must be application/json".to_string())
            }
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}
