//! Domain models for the storefront.

pub mod pagination;
pub mod session;
pub mod user;

pub use pagination::Pagination;
pub use session::{CurrentUser, keys as session_keys};
pub use user::{NewProduct, PasswordReset, User};
