//! Accounts and password handling.

use crate::domain::validator::{matches_email, Validator};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use std::sync::OnceLock;
use utoipa::ToSchema;

pub const MAX_NAME_BYTES: usize = 500;
pub const MAX_EMAIL_BYTES: usize = 500;
pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string.
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn new(name: impl Into<String>, email: &str, password_hash: String) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name: name.into(),
            email: normalize_email(email),
            password_hash,
            activated: false,
            version: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hashes with Argon2id and a fresh random salt. CPU-bound; callers on the
/// runtime should wrap it in `spawn_blocking`.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError(e.to_string()))?;

    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| PasswordError(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(plaintext: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

static UNKNOWN_ACCOUNT_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Checks a login attempt. `password_hash` is `None` when no account matched;
/// the same Argon2 verification then runs against a throwaway hash so both
/// failures take equally long. Never true without a stored hash.
pub fn verify_credentials(plaintext: &str, password_hash: Option<&str>) -> bool {
    match password_hash {
        Some(hash) => verify_password(plaintext, hash),
        None => {
            let throwaway = UNKNOWN_ACCOUNT_HASH
                .get_or_init(|| hash_password("no-such-account").ok());
            if let Some(hash) = throwaway {
                verify_password(plaintext, hash);
            }
            false
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        email.len() <= MAX_EMAIL_BYTES,
        "email",
        "must not be more than 500 bytes long",
    );
    v.check(matches_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
}
