//! Capabilities granted to users.
//!
//! The catalog routes only ever ask for the two known keys, but the store can
//! hold any code, so unknown codes survive as [`Permission::Custom`].

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    AnimesRead,
    AnimesWrite,
    Custom(String),
}

impl Permission {
    pub fn code(&self) -> &str {
        match self {
            Permission::AnimesRead => "animes:read",
            Permission::AnimesWrite => "animes:write",
            Permission::Custom(code) => code,
        }
    }
}

impl From<&str> for Permission {
    fn from(code: &str) -> Self {
        match code {
            "animes:read" => Permission::AnimesRead,
            "animes:write" => Permission::AnimesWrite,
            other => Permission::Custom(other.to_string()),
        }
    }
}

impl From<String> for Permission {
    fn from(code: String) -> Self {
        Permission::from(code.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The set of permissions held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<Permission>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn includes(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> Vec<String> {
        self.0.iter().map(|p| p.code().to_string()).collect()
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for Permissions {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        assert_eq!(Permission::from("animes:read"), Permission::AnimesRead);
        assert_eq!(Permission::from("animes:write"), Permission::AnimesWrite);
        assert_eq!(Permission::AnimesWrite.to_string(), "animes:write");
    }

    #[test]
    fn unknown_codes_are_kept() {
        let p = Permission::from("reviews:moderate");
        assert_eq!(p, Permission::Custom("reviews:moderate".to_string()));
        assert_eq!(p.code(), "reviews:moderate");
    }

    #[test]
    fn set_membership() {
        let perms: Permissions = ["animes:read", "reviews:moderate"]
            .into_iter()
            .map(Permission::from)
            .collect();
        assert!(perms.includes(&Permission::AnimesRead));
        assert!(!perms.includes(&Permission::AnimesWrite));
        assert!(perms.includes(&Permission::Custom("reviews:moderate".into())));
        assert_eq!(perms.codes(), vec!["animes:read", "reviews:moderate"]);
    }
}
