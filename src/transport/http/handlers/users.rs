use crate::domain::token::validate_token_plaintext;
use crate::domain::user::{
    hash_password, normalize_email, validate_email, validate_name, validate_password_plaintext,
};
use crate::domain::{Permission, TokenScope, User, ValidationErrors, Validator};
use crate::storage::StoreError;
use crate::transport::http::error::{ApiError, ApiResult};
use crate::transport::http::handlers::common::read_json;
use crate::transport::http::types::{
    ActivateUserRequest, AppState, ErrorEnvelope, RegisterUserRequest, UserEnvelope,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 202, description = "User registered; activation token sent", body = UserEnvelope),
        (status = 400, description = "Malformed body", body = ErrorEnvelope),
        (status = 422, description = "Failed validation or email taken", body = ErrorEnvelope)
    )
)]
pub async fn register_user_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserEnvelope>)> {
    let input = read_json(body)?;
    let email = normalize_email(&input.email);

    let mut v = Validator::new();
    validate_name(&mut v, &input.name);
    validate_email(&mut v, &email);
    validate_password_plaintext(&mut v, &input.password);
    v.into_result()?;

    let password = input.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let mut user = User::new(input.name, &email, password_hash);
    let token = state
        .models
        .users
        .register(&mut user, &[Permission::AnimesRead], TokenScope::Activation)
        .await?;
    // The account exists either way; a failed delivery is retried out of band.
    if let Err(e) = state.notifier.send_activation(&user, &token).await {
        tracing::error!(user_id = user.id, error = %e, "activation delivery failed");
    }

    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}

#[utoipa::path(
    put,
    path = "/v1/users/activated",
    request_body = ActivateUserRequest,
    responses(
        (status = 200, description = "User activated", body = UserEnvelope),
        (status = 409, description = "Edit conflict", body = ErrorEnvelope),
        (status = 422, description = "Invalid or expired token", body = ErrorEnvelope)
    )
)]
pub async fn activate_user_handler(
    State(state): State<AppState>,
    body: Result<Json<ActivateUserRequest>, JsonRejection>,
) -> ApiResult<Json<UserEnvelope>> {
    let input = read_json(body)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.into_result()?;

    let mut user = match state
        .models
        .users
        .get_for_token(TokenScope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(
                ValidationErrors::single("token", "invalid or expired activation token").into(),
            )
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    user.version = state.models.users.update(&user).await?;
    state
        .models
        .tokens
        .delete_all_for_user(TokenScope::Activation, user.id)
        .await?;

    tracing::info!(user_id = user.id, "user activated");
    Ok(Json(UserEnvelope { user }))
}
