//! The catalog record.

use crate::domain::validator::{unique, Validator};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub const MAX_TITLE_BYTES: usize = 500;
pub const MIN_YEAR: i32 = 1888;
pub const MAX_GENRES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Anime {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    /// Minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
    /// Starts at 1, bumped once per successful update.
    pub version: i32,
}

impl Anime {
    /// A record that has not been inserted yet. `id` and `version` are zero
    /// until the store assigns them.
    pub fn new(title: impl Into<String>, year: i32, runtime: i32, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title: title.into(),
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

pub fn validate_anime(v: &mut Validator, anime: &Anime) {
    v.check(!anime.title.is_empty(), "title", "must be provided");
    v.check(
        anime.title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(anime.year != 0, "year", "must be provided");
    v.check(anime.year >= MIN_YEAR, "year", "must be greater than 1888");
    v.check(
        anime.year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(anime.runtime != 0, "runtime", "must be provided");
    v.check(anime.runtime > 0, "runtime", "must be a positive integer");

    v.check(!anime.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        anime.genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        anime.genres.iter().all(|genre| !genre.is_empty()),
        "genres",
        "must not contain empty values",
    );
    v.check(unique(&anime.genres), "genres", "must not contain duplicate values");
}
