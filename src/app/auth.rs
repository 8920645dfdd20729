//! Bearer-token authentication and permission checks.

use crate::domain::token::is_well_formed;
use crate::domain::{Permission, Permissions, TokenScope, User};
use crate::storage::{PermissionStore, StoreError, UserStore};
use std::sync::Arc;

/// The identity a request runs as.
#[derive(Debug, Clone, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    User(AuthenticatedUser),
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub permissions: Permissions,
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A credential was presented but does not resolve to a user.
    #[error("invalid or missing authentication token")]
    InvalidCredential,
    #[error("you must be authenticated to access this resource")]
    Unauthenticated,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    Forbidden,
    #[error(transparent)]
    Store(StoreError),
}

/// Resolves `Authorization` header values to principals.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    permissions: Arc<dyn PermissionStore>,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>, permissions: Arc<dyn PermissionStore>) -> Self {
        Self { users, permissions }
    }

    /// `None` yields [`Principal::Anonymous`]. Any header that is present but
    /// not a known, unexpired `Bearer` token is rejected.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let Some(header) = authorization else {
            return Ok(Principal::Anonymous);
        };

        let token = bearer_token(header).ok_or(AuthError::InvalidCredential)?;

        let user = match self.users.get_for_token(TokenScope::Authentication, token).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidCredential),
            Err(e) => return Err(AuthError::Store(e)),
        };
        let permissions = self
            .permissions
            .get_all_for_user(user.id)
            .await
            .map_err(AuthError::Store)?;

        Ok(Principal::User(AuthenticatedUser { user, permissions }))
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    if scheme != "Bearer" || parts.next().is_some() || !is_well_formed(token) {
        return None;
    }
    Some(token)
}

/// Checks that `principal` may use a route guarded by `required`.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthError> {
    match principal {
        Principal::Anonymous => Err(AuthError::Unauthenticated),
        Principal::User(authenticated) if !authenticated.user.activated => {
            Err(AuthError::InactiveAccount)
        }
        Principal::User(authenticated) if !authenticated.permissions.includes(required) => {
            Err(AuthError::Forbidden)
        }
        Principal::User(_) => Ok(()),
    }
}
