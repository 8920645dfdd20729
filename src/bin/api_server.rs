// src/bin/api_server.rs

use anime_catalog::app::{LogNotifier, RateLimiter};
use anime_catalog::infra::{logging, Config};
use anime_catalog::storage::{postgres, Models};
use anime_catalog::transport;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    logging::init(config.log_format);

    // --- Store Initialization ---
    let models = match config.database_url.as_deref() {
        Some(url) => {
            let pool = postgres::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            postgres::ensure_schema(&pool)
                .await
                .context("failed to prepare database schema")?;
            tracing::info!(max_connections = config.db_max_connections, "database connection pool established");
            Models::postgres(pool, config.db_query_timeout)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using in-memory stores (data is lost on exit)");
            Models::in_memory()
        }
    };

    // --- Rate Limiter ---
    let rate_limiter = Arc::new(RateLimiter::new(config.limiter.clone()));
    let sweeper = rate_limiter.clone().start_sweeper();
    tracing::info!(
        enabled = config.limiter.enabled,
        rps = config.limiter.requests_per_second,
        burst = config.limiter.burst,
        "rate limiter started"
    );

    let config = Arc::new(config);
    let state = transport::http::AppState::new(
        models,
        rate_limiter.clone(),
        Arc::new(LogNotifier),
        config.clone(),
    );

    // --- API Server Initialization ---
    let app = transport::http::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, env = %config.env, "starting server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    rate_limiter.shutdown();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "rate limiter sweeper ended abnormally");
    }
    tracing::info!("stopped server");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("shutdown signal received (Ctrl+C)"),
        _ = terminate => tracing::info!("shutdown signal received (SIGTERM)"),
    }
}
