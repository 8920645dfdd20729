//! Persistence contracts and their backends.
//!
//! Handlers only see the traits below. Two backends implement them:
//! [`postgres`] for deployments and [`memory`] for tests and database-less
//! development. Input is validated before any of these methods is called; the
//! stores only enforce identity, version and uniqueness contracts.

pub mod memory;
pub mod postgres;

use crate::domain::{Anime, Filters, Metadata, Permission, Permissions, Token, TokenScope, User, ValidationErrors};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound applied to each store call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// Zero rows matched the id + version predicate.
    #[error("edit conflict")]
    EditConflict,
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error("query did not complete within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    InvalidFilters(#[from] ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Versioned catalog records.
#[async_trait]
pub trait AnimeStore: Send + Sync {
    /// Assigns `id`, `created_at` and `version = 1` on `anime`.
    async fn insert(&self, anime: &mut Anime) -> Result<(), StoreError>;

    async fn get(&self, id: i64) -> Result<Anime, StoreError>;

    /// Conditional write keyed on `anime.id` and `anime.version` (the version
    /// the caller last read). Returns the new version.
    async fn update(&self, anime: &Anime) -> Result<i32, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Records matching `title` (full-text, empty = any) whose genres contain
    /// every entry of `genres`, ordered by the filter's sort then `id ASC`.
    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Anime>, Metadata), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, user: &mut User) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Same optimistic contract as [`AnimeStore::update`].
    async fn update(&self, user: &User) -> Result<i32, StoreError>;

    /// The owner of an unexpired token with the given scope.
    async fn get_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, StoreError>;

    /// Inserts `user`, grants `permissions` and issues a `scope` token as one
    /// unit. On any failure none of the three is kept.
    async fn register(
        &self,
        user: &mut User,
        permissions: &[Permission],
        scope: TokenScope,
    ) -> Result<Token, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> Result<(), StoreError>;

    async fn new_token(&self, user_id: i64, scope: TokenScope) -> Result<Token, StoreError> {
        let token = Token::generate(user_id, scope.ttl(), scope);
        self.insert(&token).await?;
        Ok(token)
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_user(&self, user_id: i64, permissions: &[Permission]) -> Result<(), StoreError>;
}

/// The stores a request handler can reach.
#[derive(Clone)]
pub struct Models {
    pub animes: Arc<dyn AnimeStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    pub fn postgres(pool: sqlx::PgPool, query_timeout: Duration) -> Self {
        Self {
            animes: Arc::new(postgres::PgAnimeStore::new(pool.clone(), query_timeout)),
            users: Arc::new(postgres::PgUserStore::new(pool.clone(), query_timeout)),
            tokens: Arc::new(postgres::PgTokenStore::new(pool.clone(), query_timeout)),
            permissions: Arc::new(postgres::PgPermissionStore::new(pool, query_timeout)),
        }
    }

    pub fn in_memory() -> Self {
        let accounts = Arc::new(memory::MemoryAccounts::new());
        Self {
            animes: Arc::new(memory::MemoryAnimeStore::new()),
            users: accounts.clone(),
            tokens: accounts.clone(),
            permissions: accounts,
        }
    }
}

/// Runs `query` under `limit`. On expiry the query future is dropped, which
/// abandons the in-flight call; nothing from it is treated as committed.
pub(crate) async fn bounded<T, F>(limit: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_times_out() {
        let result: Result<(), StoreError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn bounded_maps_errors() {
        let result: Result<(), StoreError> =
            bounded(Duration::from_secs(1), async { Err(sqlx::Error::RowNotFound) }).await;
        assert!(matches!(result, Err(StoreError::Database(sqlx::Error::RowNotFound))));
    }
}
