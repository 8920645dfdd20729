use crate::domain::{Token, TokenScope};
use crate::storage::{bounded, StoreError, TokenStore};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgTokenStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

pub(super) async fn insert_token(conn: &mut PgConnection, token: &Token) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tokens (hash, user_id, expiry, scope)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&token.hash)
    .bind(token.user_id)
    .bind(token.expiry)
    .bind(token.scope.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        bounded(self.timeout, async {
            let mut conn = self.pool.acquire().await?;
            insert_token(&mut conn, token).await
        })
        .await
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> Result<(), StoreError> {
        bounded(
            self.timeout,
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
