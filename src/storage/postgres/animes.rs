use crate::domain::{calculate_metadata, Anime, Filters, Metadata};
use crate::storage::{bounded, AnimeStore, StoreError};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;

#[derive(Clone)]
pub struct PgAnimeStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgAnimeStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn anime_from_row(row: &PgRow) -> Result<Anime, sqlx::Error> {
    Ok(Anime {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        runtime: row.try_get("runtime")?,
        genres: row.try_get("genres")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl AnimeStore for PgAnimeStore {
    async fn insert(&self, anime: &mut Anime) -> Result<(), StoreError> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                "INSERT INTO animes (title, year, runtime, genres)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, created_at, version",
            )
            .bind(&anime.title)
            .bind(anime.year)
            .bind(anime.runtime)
            .bind(&anime.genres)
            .fetch_one(&self.pool),
        )
        .await?;

        anime.id = row.try_get("id")?;
        anime.created_at = row.try_get("created_at")?;
        anime.version = row.try_get("version")?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Anime, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let row = bounded(
            self.timeout,
            sqlx::query(
                "SELECT id, created_at, title, year, runtime, genres, version
                 FROM animes
                 WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => Ok(anime_from_row(&row)?),
            None => Err(StoreError::NotFound),
        }
    }

    async fn update(&self, anime: &Anime) -> Result<i32, StoreError> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                "UPDATE animes
                 SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                 WHERE id = $5 AND version = $6
                 RETURNING version",
            )
            .bind(&anime.title)
            .bind(anime.year)
            .bind(anime.runtime)
            .bind(&anime.genres)
            .bind(anime.id)
            .bind(anime.version)
            .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some(row) => Ok(row.try_get("version")?),
            None => Err(StoreError::EditConflict),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let result = bounded(
            self.timeout,
            sqlx::query("DELETE FROM animes WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Anime>, Metadata), StoreError> {
        // `column` comes from the static safelist, so formatting it in is safe.
        let order = filters.sort_order()?;
        let sql = format!(
            "SELECT count(*) OVER() AS total, id, created_at, title, year, runtime, genres, version
             FROM animes
             WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
             AND (genres @> $2 OR $2 = '{{}}')
             ORDER BY {} {}, id ASC
             LIMIT $3 OFFSET $4",
            order.column,
            order.direction.as_sql(),
        );

        let rows = bounded(
            self.timeout,
            sqlx::query(&sql)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let mut total_records = 0_i64;
        let mut animes = Vec::with_capacity(rows.len());
        for row in &rows {
            total_records = row.try_get("total")?;
            animes.push(anime_from_row(row)?);
        }

        let metadata = calculate_metadata(total_records, filters.page, filters.page_size);
        Ok((animes, metadata))
    }
}
