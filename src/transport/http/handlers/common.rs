//! Request readers shared by the handlers.

use crate::domain::Validator;
use crate::transport::http::error::{ApiError, ApiResult};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::http::HeaderMap;
use axum::Json;
use std::collections::HashMap;

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// Record ids are positive integers. Anything else is treated as a route
/// that does not exist.
pub fn read_id_param(id: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    match id {
        Ok(Path(id)) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

pub fn read_json<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(ApiError::from)
}

pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

/// Comma-separated values with empty entries dropped.
pub fn read_csv(qs: &HashMap<String, String>, key: &str) -> Vec<String> {
    qs.get(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Falls back to `default` and records a field error when the value is not
/// an integer.
pub fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key).filter(|value| !value.is_empty()) {
        None => default,
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
    }
}

/// The optional `X-Expected-Version` header, in decimal.
pub fn read_expected_version(headers: &HeaderMap) -> ApiResult<Option<i32>> {
    let Some(raw) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| {
            ApiError::BadRequest("X-Expected-Version must be an integer".to_string())
        })
}

pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}
