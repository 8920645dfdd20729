//! In-process stores.
//!
//! Used by the test suites and by `api_server` when no `DATABASE_URL` is set.
//! Each store keeps its state behind a single `parking_lot::Mutex`, so the
//! version compare-and-swap in `update` is atomic with respect to every other
//! call on the same store.

use crate::domain::token::hash_token;
use crate::domain::{
    calculate_metadata, Anime, Filters, Metadata, Permission, Permissions, SortDirection,
    SortOrder, Token, TokenScope, User,
};
use crate::storage::{AnimeStore, PermissionStore, StoreError, TokenStore, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct AnimeTable {
    next_id: i64,
    rows: BTreeMap<i64, Anime>,
}

#[derive(Default)]
pub struct MemoryAnimeStore {
    table: Mutex<AnimeTable>,
}

impl MemoryAnimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercased alphanumeric runs, roughly what the `simple` text search
/// configuration produces.
fn lexemes(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn title_matches(title: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let wanted = lexemes(query);
    if wanted.is_empty() {
        return false;
    }
    let have = lexemes(title);
    wanted.iter().all(|word| have.contains(word))
}

fn compare(a: &Anime, b: &Anime, order: SortOrder) -> Ordering {
    let primary = match order.column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    };
    let primary = match order.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl AnimeStore for MemoryAnimeStore {
    async fn insert(&self, anime: &mut Anime) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        table.next_id += 1;
        anime.id = table.next_id;
        anime.created_at = Utc::now();
        anime.version = 1;
        table.rows.insert(anime.id, anime.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Anime, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.table
            .lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, anime: &Anime) -> Result<i32, StoreError> {
        let mut table = self.table.lock();
        let row = match table.rows.get_mut(&anime.id) {
            Some(row) if row.version == anime.version => row,
            _ => return Err(StoreError::EditConflict),
        };

        row.title = anime.title.clone();
        row.year = anime.year;
        row.runtime = anime.runtime;
        row.genres = anime.genres.clone();
        row.version += 1;
        Ok(row.version)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.table
            .lock()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Anime>, Metadata), StoreError> {
        let order = filters.sort_order()?;
        let table = self.table.lock();

        let mut matched: Vec<&Anime> = table
            .rows
            .values()
            .filter(|anime| title_matches(&anime.title, title))
            .filter(|anime| genres.iter().all(|genre| anime.genres.contains(genre)))
            .collect();
        matched.sort_by(|a, b| compare(a, b, order));

        let total = matched.len() as i64;
        let page: Vec<Anime> = matched
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .cloned()
            .collect();

        // The windowed count in SQL only exists on returned rows, so a page
        // past the end reports zero records. Match that here.
        let metadata = if page.is_empty() {
            Metadata::default()
        } else {
            calculate_metadata(total, filters.page, filters.page_size)
        };
        Ok((page, metadata))
    }
}

#[derive(Default)]
struct AccountTables {
    next_user_id: i64,
    users: BTreeMap<i64, User>,
    tokens: HashMap<Vec<u8>, Token>,
    permissions: HashMap<i64, Permissions>,
}

/// Users, tokens and permissions share one lock so that token lookups and
/// user deletes see a consistent view.
#[derive(Default)]
pub struct MemoryAccounts {
    tables: Mutex<AccountTables>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryAccounts {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        tables.next_user_id += 1;
        user.id = tables.next_user_id;
        user.created_at = Utc::now();
        user.version = 1;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.tables
            .lock()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<i32, StoreError> {
        let mut tables = self.tables.lock();
        let email_taken = tables
            .users
            .values()
            .any(|other| other.id != user.id && other.email == user.email);
        if email_taken {
            return Err(StoreError::DuplicateEmail);
        }

        let row = match tables.users.get_mut(&user.id) {
            Some(row) if row.version == user.version => row,
            _ => return Err(StoreError::EditConflict),
        };
        row.name = user.name.clone();
        row.email = user.email.clone();
        row.password_hash = user.password_hash.clone();
        row.activated = user.activated;
        row.version += 1;
        Ok(row.version)
    }

    async fn get_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, StoreError> {
        let hash = hash_token(plaintext);
        let now = Utc::now();
        let tables = self.tables.lock();

        let token = tables
            .tokens
            .get(&hash)
            .filter(|token| token.scope == scope && !token.is_expired_at(now))
            .ok_or(StoreError::NotFound)?;
        tables
            .users
            .get(&token.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn register(
        &self,
        user: &mut User,
        permissions: &[Permission],
        scope: TokenScope,
    ) -> Result<Token, StoreError> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        tables.next_user_id += 1;
        user.id = tables.next_user_id;
        user.created_at = Utc::now();
        user.version = 1;

        let token = Token::generate(user.id, scope.ttl(), scope);
        tables.users.insert(user.id, user.clone());
        tables
            .permissions
            .entry(user.id)
            .or_default()
            .extend(permissions.iter().cloned());
        tables.tokens.insert(token.hash.clone(), token.clone());
        Ok(token)
    }
}

#[async_trait]
impl TokenStore for MemoryAccounts {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        tables.tokens.insert(token.hash.clone(), token.clone());
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64) -> Result<(), StoreError> {
        self.tables
            .lock()
            .tokens
            .retain(|_, token| !(token.scope == scope && token.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryAccounts {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(self
            .tables
            .lock()
            .permissions
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, permissions: &[Permission]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        tables
            .permissions
            .entry(user_id)
            .or_default()
            .extend(permissions.iter().cloned());
        Ok(())
    }
}
