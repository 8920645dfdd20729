//! End-to-end tests against the full pipeline on an ephemeral port, backed by
//! the in-memory stores.

use anime_catalog::app::{RateLimitConfig, RateLimiter, RecordingNotifier};
use anime_catalog::domain::{Anime, Filters, Metadata, Permission};
use anime_catalog::infra::Config;
use anime_catalog::storage::{AnimeStore, Models, StoreError};
use anime_catalog::transport::http::{self, AppState};
use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

struct TestApp {
    base_url: String,
    client: reqwest::Client,
    models: Models,
    notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn unlimited() -> RateLimitConfig {
    RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    }
}

async fn spawn_with(routes: Router<AppState>, limiter: RateLimitConfig) -> TestApp {
    spawn_on(Models::in_memory(), routes, limiter).await
}

async fn spawn_on(models: Models, routes: Router<AppState>, limiter: RateLimitConfig) -> TestApp {
    let notifier = Arc::new(RecordingNotifier::new());
    let config = Arc::new(Config {
        limiter: limiter.clone(),
        ..Config::default()
    });
    let state = AppState::new(
        models.clone(),
        Arc::new(RateLimiter::new(limiter)),
        notifier.clone(),
        config,
    );
    let router = http::with_pipeline(routes, state);

    // Bind to an ephemeral port to avoid conflicts with a running server.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        base_url: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        models,
        notifier,
    }
}

async fn spawn_app() -> TestApp {
    spawn_with(http::routes(), unlimited()).await
}

/// Registers, optionally activates, grants `extra` permissions and returns a
/// bearer token for the new user.
async fn login(app: &TestApp, email: &str, activate: bool, extra: &[Permission]) -> String {
    let password = "pa55word-long";
    let resp = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({ "name": "Tester", "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = resp.json().await.unwrap();
    let user_id = body["user"]["id"].as_i64().unwrap();
    assert_eq!(body["user"]["activated"], false);
    assert!(body["user"].get("password_hash").is_none());

    if activate {
        let token = app.notifier.token_for(email).unwrap();
        let resp = app
            .client
            .put(app.url("/v1/users/activated"))
            .json(&json!({ "token": token }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["user"]["activated"], true);
    }

    if !extra.is_empty() {
        app.models
            .permissions
            .add_for_user(user_id, extra)
            .await
            .unwrap();
    }

    let resp = app
        .client
        .post(app.url("/v1/tokens/authentication"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn writer(app: &TestApp) -> String {
    login(app, "writer@example.com", true, &[Permission::AnimesWrite]).await
}

async fn create(app: &TestApp, token: &str, anime: Value) -> Value {
    let resp = app
        .client
        .post(app.url("/v1/animes"))
        .bearer_auth(token)
        .json(&anime)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn create_update_conflict_delete() {
    let app = spawn_app().await;
    let token = writer(&app).await;

    let resp = app
        .client
        .post(app.url("/v1/animes"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Naruto",
            "year": 2002,
            "runtime": 23,
            "genres": ["action", "adventure"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()["location"], "/v1/animes/1");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["anime"]["id"], 1);
    assert_eq!(body["anime"]["version"], 1);
    assert!(body["anime"].get("created_at").is_none());

    let patch = || {
        app.client
            .patch(app.url("/v1/animes/1"))
            .bearer_auth(&token)
            .header("X-Expected-Version", "1")
            .json(&json!({ "year": 2003 }))
    };

    let resp = patch().send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["anime"]["version"], 2);
    assert_eq!(body["anime"]["year"], 2003);
    assert_eq!(body["anime"]["title"], "Naruto");

    let resp = patch().send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .client
        .delete(app.url("/v1/animes/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "anime successfully deleted");

    let resp = app
        .client
        .get(app.url("/v1/animes/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

/// Lets another writer land between the handler's read and its write.
struct InterleavedWriter {
    inner: Arc<dyn AnimeStore>,
}

#[async_trait]
impl AnimeStore for InterleavedWriter {
    async fn insert(&self, anime: &mut Anime) -> Result<(), StoreError> {
        self.inner.insert(anime).await
    }

    async fn get(&self, id: i64) -> Result<Anime, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, anime: &Anime) -> Result<i32, StoreError> {
        let current = self.inner.get(anime.id).await?;
        self.inner.update(&current).await?;
        self.inner.update(anime).await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Anime>, Metadata), StoreError> {
        self.inner.list(title, genres, filters).await
    }
}

#[tokio::test]
async fn concurrent_write_between_read_and_update_conflicts() {
    let base = Models::in_memory();
    let models = Models {
        animes: Arc::new(InterleavedWriter {
            inner: base.animes.clone(),
        }),
        ..base
    };
    let app = spawn_on(models, http::routes(), unlimited()).await;
    let token = writer(&app).await;
    create(
        &app,
        &token,
        json!({ "title": "Trigun", "year": 1998, "runtime": 24, "genres": ["action"] }),
    )
    .await;

    // No expected version: the read succeeds and the conditional write loses.
    let resp = app
        .client
        .patch(app.url("/v1/animes/1"))
        .bearer_auth(&token)
        .json(&json!({ "runtime": 25 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let stored = app.models.animes.get(1).await.unwrap();
    assert_eq!((stored.version, stored.runtime), (2, 24));

    // A stale expected version is rejected before any write.
    let resp = app
        .client
        .patch(app.url("/v1/animes/1"))
        .bearer_auth(&token)
        .header("X-Expected-Version", "1")
        .json(&json!({ "runtime": 25 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the record has been modified since version 1; reload it and try again"
    );
    assert_eq!(app.models.animes.get(1).await.unwrap().version, 2);
}

#[tokio::test]
async fn expected_version_must_be_decimal() {
    let app = spawn_app().await;
    let token = writer(&app).await;
    create(
        &app,
        &token,
        json!({ "title": "Akira", "year": 1988, "runtime": 124, "genres": ["sci-fi"] }),
    )
    .await;

    let resp = app
        .client
        .patch(app.url("/v1/animes/1"))
        .bearer_auth(&token)
        .header("X-Expected-Version", "one")
        .json(&json!({ "runtime": 125 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn permission_pipeline() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/v1/animes")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["vary"], "Authorization");

    let reader = login(&app, "reader@example.com", true, &[]).await;
    let resp = app
        .client
        .get(app.url("/v1/animes"))
        .bearer_auth(&reader)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .client
        .post(app.url("/v1/animes"))
        .bearer_auth(&reader)
        .json(&json!({ "title": "Bleach", "year": 2004, "runtime": 24, "genres": ["action"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let inactive = login(&app, "inactive@example.com", false, &[]).await;
    let resp = app
        .client
        .get(app.url("/v1/animes"))
        .bearer_auth(&inactive)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn invalid_bearer_is_rejected_everywhere() {
    let app = spawn_app().await;
    let resp = app
        .client
        .get(app.url("/v1/healthcheck"))
        .bearer_auth("0123456789abcdef0123456789abcdef")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");
}

#[tokio::test]
async fn healthcheck_reports_environment() {
    let app = spawn_app().await;
    let resp = app.client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");
    assert_eq!(body["system_info"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn list_filters_sorts_and_pages() {
    let app = spawn_app().await;
    let token = writer(&app).await;
    for anime in [
        json!({ "title": "Naruto", "year": 2002, "runtime": 23, "genres": ["action", "adventure"] }),
        json!({ "title": "Cowboy Bebop", "year": 1998, "runtime": 24, "genres": ["action", "sci-fi"] }),
        json!({ "title": "Naruto Shippuden", "year": 2007, "runtime": 23, "genres": ["action", "adventure"] }),
        json!({ "title": "Spirited Away", "year": 2001, "runtime": 125, "genres": ["fantasy"] }),
    ] {
        create(&app, &token, anime).await;
    }

    let resp = app
        .client
        .get(app.url("/v1/animes?genres=action&sort=-year&page_size=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let titles: Vec<&str> = body["animes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Naruto Shippuden", "Naruto"]);
    assert_eq!(
        body["metadata"],
        json!({
            "current_page": 1,
            "page_size": 2,
            "first_page": 1,
            "last_page": 2,
            "total_records": 3
        })
    );

    let resp = app
        .client
        .get(app.url("/v1/animes?title=naruto&sort=id"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["animes"].as_array().unwrap().len(), 2);

    let resp = app
        .client
        .get(app.url("/v1/animes?page=40"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["animes"], json!([]));
    assert_eq!(body["metadata"]["total_records"], 0);
}

#[tokio::test]
async fn list_rejects_bad_filters() {
    let app = spawn_app().await;
    let token = writer(&app).await;

    let resp = app
        .client
        .get(app.url("/v1/animes?sort=created_at&page=abc&page_size=500"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        json!({
            "sort": "invalid sort value",
            "page": "must be an integer value",
            "page_size": "must be a maximum of 100"
        })
    );
}

#[tokio::test]
async fn bad_bodies_and_ids() {
    let app = spawn_app().await;
    let token = writer(&app).await;

    let resp = app
        .client
        .post(app.url("/v1/animes"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Naruto", "rating": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .post(app.url("/v1/animes"))
        .bearer_auth(&token)
        .json(&json!({ "title": "", "year": 1800, "runtime": 10, "genres": ["a", "a"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["title"], "must be provided");
    assert_eq!(body["error"]["year"], "must be greater than 1888");
    assert_eq!(body["error"]["genres"], "must not contain duplicate values");

    for path in ["/v1/animes/abc", "/v1/animes/0", "/v1/animes/-3"] {
        let resp = app
            .client
            .get(app.url(path))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn unknown_routes_and_methods_get_json_errors() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/v1/nope")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "the requested resource could not be found");

    let resp = app
        .client
        .delete(app.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the DELETE method is not supported for this resource"
    );
}

#[tokio::test]
async fn account_errors() {
    let app = spawn_app().await;
    login(&app, "alice@example.com", true, &[]).await;

    let resp = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({ "name": "Alice", "email": "ALICE@example.com", "password": "another-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );

    let resp = app
        .client
        .put(app.url("/v1/users/activated"))
        .json(&json!({ "token": "0123456789abcdef0123456789abcdef" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["token"], "invalid or expired activation token");

    let resp = app
        .client
        .post(app.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "alice@example.com", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid authentication credentials");
}

#[tokio::test]
async fn rate_limit_rejects_with_retry_after() {
    let app = spawn_with(
        http::routes(),
        RateLimitConfig {
            requests_per_second: 0.01,
            burst: 2,
            ..RateLimitConfig::default()
        },
    )
    .await;

    for _ in 0..2 {
        let resp = app.client.get(app.url("/v1/healthcheck")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = app.client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()["retry-after"], "1");
}

#[tokio::test]
async fn docs_share_the_request_pipeline() {
    let app = spawn_with(
        http::routes().merge(http::docs()),
        RateLimitConfig {
            requests_per_second: 0.001,
            burst: 1,
            ..RateLimitConfig::default()
        },
    )
    .await;

    let resp = app.client.get(app.url("/api-docs/openapi.json")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get_all("vary")
        .iter()
        .any(|v| v == "Authorization"));
    let doc: Value = resp.json().await.unwrap();
    assert!(doc["paths"].get("/v1/animes").is_some());

    let resp = app.client.get(app.url("/api-docs/openapi.json")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()["retry-after"], "1");
}

#[tokio::test]
async fn docs_reject_invalid_bearer() {
    let app = spawn_with(http::routes().merge(http::docs()), unlimited()).await;
    let resp = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn panics_become_500_and_server_keeps_serving() {
    let routes = http::routes().route("/boom", get(boom));
    let app = spawn_with(routes, unlimited()).await;

    for _ in 0..2 {
        let resp = app.client.get(app.url("/boom")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body["error"],
            "the server encountered a problem and could not process your request"
        );
    }

    let resp = app.client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
