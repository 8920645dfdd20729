//! PostgreSQL-backed stores.

mod animes;
mod permissions;
mod tokens;
mod users;

pub use animes::PgAnimeStore;
pub use permissions::PgPermissionStore;
pub use tokens::PgTokenStore;
pub use users::PgUserStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(Duration::from_secs(15 * 60))
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Creates the tables and indexes the stores rely on. Idempotent; runs on
/// every boot.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS animes (
            id bigserial PRIMARY KEY,
            created_at timestamp(0) with time zone NOT NULL DEFAULT NOW(),
            title text NOT NULL,
            year integer NOT NULL,
            runtime integer NOT NULL,
            genres text[] NOT NULL,
            version integer NOT NULL DEFAULT 1,
            CONSTRAINT animes_runtime_check CHECK (runtime >= 0),
            CONSTRAINT animes_year_check CHECK (year BETWEEN 1888 AND date_part('year', now())),
            CONSTRAINT genres_length_check CHECK (array_length(genres, 1) BETWEEN 1 AND 5)
        )",
        "CREATE INDEX IF NOT EXISTS animes_title_idx ON animes USING GIN (to_tsvector('simple', title))",
        "CREATE INDEX IF NOT EXISTS animes_genres_idx ON animes USING GIN (genres)",
        "CREATE TABLE IF NOT EXISTS users (
            id bigserial PRIMARY KEY,
            created_at timestamp(0) with time zone NOT NULL DEFAULT NOW(),
            name text NOT NULL,
            email text NOT NULL,
            password_hash text NOT NULL,
            activated bool NOT NULL,
            version integer NOT NULL DEFAULT 1,
            CONSTRAINT users_email_key UNIQUE (email)
        )",
        "CREATE TABLE IF NOT EXISTS tokens (
            hash bytea PRIMARY KEY,
            user_id bigint NOT NULL REFERENCES users ON DELETE CASCADE,
            expiry timestamp(0) with time zone NOT NULL,
            scope text NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS permissions (
            id bigserial PRIMARY KEY,
            code text NOT NULL UNIQUE
        )",
        "CREATE TABLE IF NOT EXISTS users_permissions (
            user_id bigint NOT NULL REFERENCES users ON DELETE CASCADE,
            permission_id bigint NOT NULL REFERENCES permissions ON DELETE CASCADE,
            PRIMARY KEY (user_id, permission_id)
        )",
        "INSERT INTO permissions (code) VALUES ('animes:read'), ('animes:write')
            ON CONFLICT (code) DO NOTHING",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Maps a unique-violation on `constraint` to `mapped`, leaving every other
/// error untouched.
pub(crate) fn on_constraint(
    err: crate::storage::StoreError,
    constraint: &str,
    mapped: crate::storage::StoreError,
) -> crate::storage::StoreError {
    match &err {
        crate::storage::StoreError::Database(sqlx::Error::Database(db))
            if db.constraint() == Some(constraint) =>
        {
            mapped
        }
        _ => err,
    }
}
