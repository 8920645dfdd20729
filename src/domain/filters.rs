//! Paging and sorting for list queries.
//!
//! `Filters` is validated in the handler before any query is built. The sort
//! column handed to a store is always one of the `'static` safelist entries,
//! never client text, so it can be interpolated into SQL.

use crate::domain::validator::{permitted_value, ValidationErrors, Validator};
use serde::Serialize;
use utoipa::ToSchema;

/// Sort keys accepted by `GET /v1/animes`.
pub const ANIME_SORT_SAFELIST: &[&str] = &["id", "title", "year", "runtime"];

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A resolved, safelisted ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    /// Raw sort value, e.g. `year` or `-year`.
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn new(
        page: i64,
        page_size: i64,
        sort: impl Into<String>,
        sort_safelist: &'static [&'static str],
    ) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safelist,
        }
    }

    /// The sort value without its `-` prefix, if it is safelisted.
    pub fn sort_column(&self) -> Result<&'static str, ValidationErrors> {
        let requested = self.sort.strip_prefix('-').unwrap_or(&self.sort);
        self.sort_safelist
            .iter()
            .copied()
            .find(|candidate| *candidate == requested)
            .ok_or_else(|| ValidationErrors::single("sort", "invalid sort value"))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn sort_order(&self) -> Result<SortOrder, ValidationErrors> {
        Ok(SortOrder {
            column: self.sort_column()?,
            direction: self.sort_direction(),
        })
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    let requested = filters.sort.strip_prefix('-').unwrap_or(&filters.sort);
    v.check(
        permitted_value(requested, filters.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

/// Pagination metadata derived from a total row count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records <= 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
