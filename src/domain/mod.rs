//! Domain types and their validation rules.

pub mod anime;
pub mod filters;
pub mod permission;
pub mod token;
pub mod user;
pub mod validator;

pub use anime::{validate_anime, Anime};
pub use filters::{calculate_metadata, Filters, Metadata, SortDirection, SortOrder};
pub use permission::{Permission, Permissions};
pub use token::{Token, TokenScope};
pub use user::User;
pub use validator::{ValidationErrors, Validator};
