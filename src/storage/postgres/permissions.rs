use crate::domain::{Permission, Permissions};
use crate::storage::{bounded, PermissionStore, StoreError};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};
use std::time::Duration;

#[derive(Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

/// Grants `codes` to `user_id`, creating rows for codes not seen before.
pub(super) async fn grant(
    conn: &mut PgConnection,
    user_id: i64,
    codes: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO permissions (code)
         SELECT unnest($1::text[])
         ON CONFLICT (code) DO NOTHING",
    )
    .bind(codes)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO users_permissions (user_id, permission_id)
         SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(codes)
    .execute(conn)
    .await?;
    Ok(())
}

pub(super) fn permission_codes(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.code().to_string()).collect()
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let rows = bounded(
            self.timeout,
            sqlx::query(
                "SELECT permissions.code
                 FROM permissions
                 INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                 WHERE users_permissions.user_id = $1",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;

        let mut permissions = Permissions::new();
        for row in rows {
            let code: String = row.try_get("code")?;
            permissions.insert(Permission::from(code));
        }
        Ok(permissions)
    }

    async fn add_for_user(&self, user_id: i64, permissions: &[Permission]) -> Result<(), StoreError> {
        let codes = permission_codes(permissions);

        bounded(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            grant(tx.as_mut(), user_id, &codes).await?;
            tx.commit().await
        })
        .await
    }
}
