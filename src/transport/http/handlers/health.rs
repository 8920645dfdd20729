use crate::transport::http::types::{AppState, HealthResponse, SystemInfo};
use axum::extract::State;
use axum::Json;

#[utoipa::path(
    get,
    path = "/v1/healthcheck",
    responses(
        (status = 200, description = "Service is available", body = HealthResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}
