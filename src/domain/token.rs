//! Opaque bearer and activation tokens.
//!
//! Plaintext tokens are 16 random bytes hex-encoded. Only the SHA-256 of the
//! plaintext is stored.

use crate::domain::validator::Validator;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const TOKEN_PLAINTEXT_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            TokenScope::Activation => Duration::days(3),
            TokenScope::Authentication => Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub plaintext: String,
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    pub fn generate(user_id: i64, ttl: Duration, scope: TokenScope) -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let hash = hash_token(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Shape check only; says nothing about whether the token exists.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(is_well_formed(plaintext), "token", "must be 32 hex characters long");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_well_formed_and_distinct() {
        let a = Token::generate(7, TokenScope::Authentication.ttl(), TokenScope::Authentication);
        let b = Token::generate(7, TokenScope::Authentication.ttl(), TokenScope::Authentication);
        assert!(is_well_formed(&a.plaintext));
        assert_ne!(a.plaintext, b.plaintext);
        assert_eq!(a.hash, hash_token(&a.plaintext));
        assert_eq!(a.hash.len(), 32);
        assert!(a.expiry > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn well_formed_rejects_other_shapes() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("ABCDEF0123456789abcdef0123456789"));
        assert!(!is_well_formed("0123456789abcdef0123456789abcde"));
        assert!(!is_well_formed("0123456789abcdef0123456789abcdeg"));
        assert!(is_well_formed("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn expiry_check() {
        let token = Token::generate(1, Duration::seconds(-1), TokenScope::Activation);
        assert!(token.is_expired_at(Utc::now()));
    }
}
