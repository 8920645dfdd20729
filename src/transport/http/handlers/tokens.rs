use crate::domain::user::{normalize_email, validate_email, validate_password_plaintext, verify_credentials};
use crate::domain::{TokenScope, Validator};
use crate::storage::StoreError;
use crate::transport::http::error::{ApiError, ApiResult};
use crate::transport::http::handlers::common::read_json;
use crate::transport::http::types::{
    AppState, AuthenticationTokenEnvelope, CreateAuthenticationTokenRequest, ErrorEnvelope,
    IssuedToken,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    post,
    path = "/v1/tokens/authentication",
    request_body = CreateAuthenticationTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = AuthenticationTokenEnvelope),
        (status = 401, description = "Invalid credentials", body = ErrorEnvelope),
        (status = 422, description = "Failed validation", body = ErrorEnvelope)
    )
)]
pub async fn create_authentication_token_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateAuthenticationTokenRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthenticationTokenEnvelope>)> {
    let input = read_json(body)?;
    let email = normalize_email(&input.email);

    let mut v = Validator::new();
    validate_email(&mut v, &email);
    validate_password_plaintext(&mut v, &input.password);
    v.into_result()?;

    let user = match state.models.users.get_by_email(&email).await {
        Ok(user) => Some(user),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let password = input.password;
    let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
    let matches =
        tokio::task::spawn_blocking(move || verify_credentials(&password, stored_hash.as_deref()))
            .await
            .map_err(ApiError::internal)?;
    let user = match user {
        Some(user) if matches => user,
        Some(user) => {
            tracing::debug!(user_id = user.id, "password mismatch");
            return Err(ApiError::InvalidCredentials);
        }
        None => return Err(ApiError::InvalidCredentials),
    };

    let token = state
        .models
        .tokens
        .new_token(user.id, TokenScope::Authentication)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenEnvelope {
            authentication_token: IssuedToken {
                token: token.plaintext,
                expiry: token.expiry,
            },
        }),
    ))
}
