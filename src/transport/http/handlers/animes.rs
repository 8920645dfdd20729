use crate::domain::filters::{validate_filters, ANIME_SORT_SAFELIST};
use crate::domain::{validate_anime, Anime, Filters, Validator};
use crate::transport::http::error::{ApiError, ApiResult};
use crate::transport::http::handlers::common::{
    read_csv, read_expected_version, read_id_param, read_int, read_json, read_string,
};
use crate::transport::http::types::{
    AnimeEnvelope, AnimeListEnvelope, AppState, CreateAnimeRequest, ErrorEnvelope,
    MessageEnvelope, UpdateAnimeRequest,
};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::collections::HashMap;

#[utoipa::path(
    post,
    path = "/v1/animes",
    request_body = CreateAnimeRequest,
    responses(
        (status = 201, description = "Record created", body = AnimeEnvelope),
        (status = 400, description = "Malformed body", body = ErrorEnvelope),
        (status = 422, description = "Failed validation", body = ErrorEnvelope)
    ),
    security(("bearer" = []))
)]
pub async fn create_anime_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateAnimeRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = read_json(body)?;
    let mut anime = Anime::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_anime(&mut v, &anime);
    v.into_result()?;

    state.models.animes.insert(&mut anime).await?;
    tracing::info!(anime_id = anime.id, "anime created");

    let location = format!("/v1/animes/{}", anime.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(AnimeEnvelope { anime }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/animes/{id}",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "The record", body = AnimeEnvelope),
        (status = 404, description = "No such record", body = ErrorEnvelope)
    ),
    security(("bearer" = []))
)]
pub async fn show_anime_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<AnimeEnvelope>> {
    let id = read_id_param(id)?;
    let anime = state.models.animes.get(id).await?;
    Ok(Json(AnimeEnvelope { anime }))
}

/// Partial update. `X-Expected-Version`, when sent, must equal the stored
/// version before anything is applied; the write itself is still conditional
/// on the version read here.
#[utoipa::path(
    patch,
    path = "/v1/animes/{id}",
    params(
        ("id" = i64, Path, description = "Record id"),
        ("X-Expected-Version" = Option<i32>, Header, description = "Version the client last saw")
    ),
    request_body = UpdateAnimeRequest,
    responses(
        (status = 200, description = "Updated record", body = AnimeEnvelope),
        (status = 404, description = "No such record", body = ErrorEnvelope),
        (status = 409, description = "Edit conflict", body = ErrorEnvelope),
        (status = 422, description = "Failed validation", body = ErrorEnvelope)
    ),
    security(("bearer" = []))
)]
pub async fn update_anime_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<UpdateAnimeRequest>, JsonRejection>,
) -> ApiResult<Json<AnimeEnvelope>> {
    let id = read_id_param(id)?;
    let mut anime = state.models.animes.get(id).await?;

    if let Some(expected) = read_expected_version(&headers)? {
        if expected != anime.version {
            return Err(ApiError::VersionMismatch { expected });
        }
    }

    let input = read_json(body)?;
    if let Some(title) = input.title {
        anime.title = title;
    }
    if let Some(year) = input.year {
        anime.year = year;
    }
    if let Some(runtime) = input.runtime {
        anime.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        anime.genres = genres;
    }

    let mut v = Validator::new();
    validate_anime(&mut v, &anime);
    v.into_result()?;

    anime.version = state.models.animes.update(&anime).await?;
    tracing::info!(anime_id = anime.id, version = anime.version, "anime updated");
    Ok(Json(AnimeEnvelope { anime }))
}

#[utoipa::path(
    delete,
    path = "/v1/animes/{id}",
    params(("id" = i64, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record deleted", body = MessageEnvelope),
        (status = 404, description = "No such record", body = ErrorEnvelope)
    ),
    security(("bearer" = []))
)]
pub async fn delete_anime_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<MessageEnvelope>> {
    let id = read_id_param(id)?;
    state.models.animes.delete(id).await?;
    tracing::info!(anime_id = id, "anime deleted");
    Ok(Json(MessageEnvelope {
        message: "anime successfully deleted".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/animes",
    params(
        ("title" = Option<String>, Query, description = "Full-text title match"),
        ("genres" = Option<String>, Query, description = "Comma-separated genres, all required"),
        ("page" = Option<i64>, Query, description = "1-based page, default 1"),
        ("page_size" = Option<i64>, Query, description = "Default 20, at most 100"),
        ("sort" = Option<String>, Query, description = "id, title, year or runtime; prefix - for descending")
    ),
    responses(
        (status = 200, description = "One page of records", body = AnimeListEnvelope),
        (status = 422, description = "Invalid filters", body = ErrorEnvelope)
    ),
    security(("bearer" = []))
)]
pub async fn list_animes_handler(
    State(state): State<AppState>,
    Query(qs): Query<HashMap<String, String>>,
) -> ApiResult<Json<AnimeListEnvelope>> {
    let mut v = Validator::new();

    let title = read_string(&qs, "title", "");
    let genres = read_csv(&qs, "genres");
    let filters = Filters::new(
        read_int(&qs, "page", 1, &mut v),
        read_int(&qs, "page_size", 20, &mut v),
        read_string(&qs, "sort", "id"),
        ANIME_SORT_SAFELIST,
    );

    validate_filters(&mut v, &filters);
    v.into_result()?;

    let (animes, metadata) = state.models.animes.list(&title, &genres, &filters).await?;
    Ok(Json(AnimeListEnvelope { animes, metadata }))
}
