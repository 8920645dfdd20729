//! Request pipeline stages.
//!
//! Outermost first: panic recovery, rate limiting, authentication, then the
//! per-route permission check. Each stage short-circuits with an [`ApiError`].

use crate::app::{authorize, Principal};
use crate::domain::Permission;
use crate::transport::http::error::ApiError;
use crate::transport::http::types::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{ALLOW, AUTHORIZATION, CONTENT_TYPE, VARY};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::any::Any;
use std::net::{IpAddr, SocketAddr};

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.rate_limiter.enabled() {
        return Ok(next.run(req).await);
    }

    let ip = client_ip(&req, state.config.trust_proxy)
        .ok_or_else(|| ApiError::internal("client address unavailable; serve with connect info"))?;

    if let Err(e) = state.rate_limiter.allow(ip) {
        tracing::warn!(client = %ip, "rate limit exceeded");
        return Err(e.into());
    }
    Ok(next.run(req).await)
}

fn client_ip(req: &Request, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(req.headers()) {
            return Some(ip);
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    first("x-forwarded-for").or_else(|| first("x-real-ip"))
}

/// Resolves the `Authorization` header into a [`Principal`] extension.
/// Responses always vary on `Authorization`.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = match req.headers().get(AUTHORIZATION).map(|v| v.to_str()) {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value.to_string())),
        Some(Err(_)) => Err(ApiError::InvalidAuthenticationToken),
    };

    let resolved = match header {
        Ok(header) => state
            .authenticator
            .resolve(header.as_deref())
            .await
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };

    let mut response = match resolved {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "authentication rejected");
            e.into_response()
        }
    };
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Route layer guarding a handler with `required`.
pub async fn require_permission(
    State(required): State<Permission>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_default();

    if let Err(e) = authorize(&principal, &required) {
        tracing::debug!(permission = %required, error = %e, "permission denied");
        return Err(e.into());
    }
    Ok(next.run(req).await)
}

/// Panic handler for `CatchPanicLayer`. The connection stays usable.
pub fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Gives the router's empty 405 responses a JSON body.
pub async fn json_method_not_allowed(method: Method, response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED
        || response.headers().contains_key(CONTENT_TYPE)
    {
        return response;
    }

    let allow = response.headers().get(ALLOW).cloned();
    let mut rendered = ApiError::MethodNotAllowed(method.to_string()).into_response();
    if let Some(allow) = allow {
        rendered.headers_mut().insert(ALLOW, allow);
    }
    rendered
}
