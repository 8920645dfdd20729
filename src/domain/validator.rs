//! Field-level input validation.
//!
//! A [`Validator`] collects one message per field. Handlers run the domain
//! `validate_*` functions against it and turn the result into a 422 response
//! before any store is touched.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

/// Field name -> message map returned to clients on failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("input failed validation: {0:?}")]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    /// Single-field error, for checks that happen outside a [`Validator`] run.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), message.into());
        Self(errors)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records `message` for `field` unless the field already has an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// True when every value in the slice is distinct.
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}

pub fn permitted_value(value: &str, permitted: &[&str]) -> bool {
    permitted.contains(&value)
}

pub fn matches_email(value: &str) -> bool {
    static EMAIL_RX: OnceLock<Regex> = OnceLock::new();
    EMAIL_RX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("EMAIL_PATTERN is a valid regex"))
        .is_match(value)
}
