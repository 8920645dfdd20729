use super::on_constraint;
use super::permissions::{grant, permission_codes};
use super::tokens::insert_token;
use crate::domain::token::hash_token;
use crate::domain::{Permission, Token, TokenScope, User};
use crate::storage::{bounded, StoreError, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                "INSERT INTO users (name, email, password_hash, activated)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, created_at, version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| on_constraint(e, EMAIL_CONSTRAINT, StoreError::DuplicateEmail))?;

        user.id = row.try_get("id")?;
        user.created_at = row.try_get("created_at")?;
        user.version = row.try_get("version")?;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                "SELECT id, created_at, name, email, password_hash, activated, version
                 FROM users
                 WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => Ok(user_from_row(&row)?),
            None => Err(StoreError::NotFound),
        }
    }

    async fn update(&self, user: &User) -> Result<i32, StoreError> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                "UPDATE users
                 SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                 WHERE id = $5 AND version = $6
                 RETURNING version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(|e| on_constraint(e, EMAIL_CONSTRAINT, StoreError::DuplicateEmail))?;

        match row {
            Some(row) => Ok(row.try_get("version")?),
            None => Err(StoreError::EditConflict),
        }
    }

    async fn get_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, StoreError> {
        let hash = hash_token(plaintext);
        let row = bounded(
            self.timeout,
            sqlx::query(
                "SELECT users.id, users.created_at, users.name, users.email,
                        users.password_hash, users.activated, users.version
                 FROM users
                 INNER JOIN tokens ON users.id = tokens.user_id
                 WHERE tokens.hash = $1
                 AND tokens.scope = $2
                 AND tokens.expiry > $3",
            )
            .bind(&hash)
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => Ok(user_from_row(&row)?),
            None => Err(StoreError::NotFound),
        }
    }

    async fn register(
        &self,
        user: &mut User,
        permissions: &[Permission],
        scope: TokenScope,
    ) -> Result<Token, StoreError> {
        let codes = permission_codes(permissions);

        let (row, token) = bounded(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            let row = sqlx::query(
                "INSERT INTO users (name, email, password_hash, activated)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, created_at, version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(tx.as_mut())
            .await?;
            let user_id: i64 = row.try_get("id")?;

            grant(tx.as_mut(), user_id, &codes).await?;
            let token = Token::generate(user_id, scope.ttl(), scope);
            insert_token(tx.as_mut(), &token).await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>((row, token))
        })
        .await
        .map_err(|e| on_constraint(e, EMAIL_CONSTRAINT, StoreError::DuplicateEmail))?;

        user.id = row.try_get("id")?;
        user.created_at = row.try_get("created_at")?;
        user.version = row.try_get("version")?;
        Ok(token)
    }
}
