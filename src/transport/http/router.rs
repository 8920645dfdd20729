use crate::domain::{Anime, Metadata, Permission, User};
use crate::transport::http::error::MAX_BODY_BYTES;
use crate::transport::http::handlers::{animes, common, health, tokens, users};
use crate::transport::http::middleware::{
    authenticate, json_method_not_allowed, rate_limit, recover_panic, require_permission,
};
use crate::transport::http::types::{
    ActivateUserRequest, AnimeEnvelope, AnimeListEnvelope, AppState,
    AuthenticationTokenEnvelope, CreateAnimeRequest, CreateAuthenticationTokenRequest,
    ErrorEnvelope, HealthResponse, IssuedToken, MessageEnvelope, RegisterUserRequest,
    SystemInfo, UpdateAnimeRequest, UserEnvelope,
};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::{from_fn_with_state, map_response};
use axum::routing::{get, patch, post, put, MethodRouter};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        animes::list_animes_handler,
        animes::create_anime_handler,
        animes::show_anime_handler,
        animes::update_anime_handler,
        animes::delete_anime_handler,
        users::register_user_handler,
        users::activate_user_handler,
        tokens::create_authentication_token_handler
    ),
    components(schemas(
        Anime,
        Metadata,
        User,
        CreateAnimeRequest,
        UpdateAnimeRequest,
        RegisterUserRequest,
        ActivateUserRequest,
        CreateAuthenticationTokenRequest,
        AnimeEnvelope,
        AnimeListEnvelope,
        MessageEnvelope,
        UserEnvelope,
        IssuedToken,
        AuthenticationTokenEnvelope,
        HealthResponse,
        SystemInfo,
        ErrorEnvelope
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Wraps `route` so it only runs for principals holding `permission`.
fn guarded(route: MethodRouter<AppState>, permission: Permission) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(permission, require_permission))
}

/// The route table, without the shared pipeline.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck_handler))
        .route(
            "/v1/animes",
            guarded(get(animes::list_animes_handler), Permission::AnimesRead)
                .merge(guarded(post(animes::create_anime_handler), Permission::AnimesWrite)),
        )
        .route(
            "/v1/animes/:id",
            guarded(get(animes::show_anime_handler), Permission::AnimesRead)
                .merge(guarded(
                    patch(animes::update_anime_handler).delete(animes::delete_anime_handler),
                    Permission::AnimesWrite,
                )),
        )
        .route("/v1/users", post(users::register_user_handler))
        .route("/v1/users/activated", put(users::activate_user_handler))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token_handler),
        )
        .fallback(common::not_found_handler)
}

/// Applies the request pipeline to `routes`. Listed innermost first; the
/// last layer added sees the request first.
pub fn with_pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_trusted_origins);

    routes
        .layer(map_response(json_method_not_allowed))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Swagger UI at `/swagger-ui` and the OpenAPI document it reads.
pub fn docs() -> Router<AppState> {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

/// API and docs routes behind the full pipeline.
pub fn create_router(state: AppState) -> Router {
    with_pipeline(routes().merge(docs()), state)
}

fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-expected-version"),
        ])
}
