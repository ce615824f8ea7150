//! Database operations for storefront `PostgreSQL`.
//!
//! # Tables
//!
//! - `storefront.user` - Accounts, each with an embedded JSONB cart and a
//!   `cart_version` counter for optimistic concurrency
//! - `storefront.product` - The catalog
//! - `storefront."order"` - Append-only orders with JSONB item snapshots
//! - `tower_sessions.session` - Session storage (created by `emp-cli migrate`)
//!
//! # Store traits
//!
//! Services talk to storage through [`CatalogStore`], [`UserStore`] and
//! [`OrderStore`]. The `PostgreSQL` repositories in this module implement
//! them for production; the integration tests provide in-memory versions.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p emporium-cli -- migrate
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use emporium_core::{Cart, Email, NewOrder, Order, OrderId, Product, ProductId, UserId};

use crate::models::{NewProduct, PasswordReset, User};

pub mod orders;
pub mod products;
pub mod users;

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or stale version.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Read and write access to the product catalog.
pub trait CatalogStore: Send + Sync {
    /// Look up a product by ID.
    fn get_product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// One page of products, oldest first.
    fn list_products(
        &self,
        offset: u64,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Total number of products.
    fn count_products(&self) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Products listed by `owner`.
    fn products_by_owner(
        &self,
        owner: UserId,
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Insert a product.
    fn create_product(
        &self,
        product: &NewProduct,
    ) -> impl Future<Output = Result<Product, RepositoryError>> + Send;

    /// Overwrite a product's fields.
    ///
    /// Only a row matching both `product.id` and `product.owner_id` is
    /// touched; otherwise `RepositoryError::NotFound` is returned.
    fn update_product(
        &self,
        product: &Product,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a product owned by `owner`. Returns `false` if no such row.
    fn delete_product(
        &self,
        id: ProductId,
        owner: UserId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Accounts and their embedded carts.
pub trait UserStore: Send + Sync {
    /// Load a user by ID.
    fn get_user(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Load a user by email.
    fn get_by_email(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Load a user together with their password hash.
    fn get_password_hash(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Option<(User, String)>, RepositoryError>> + Send;

    /// Create a user with an empty cart.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    fn create_user(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> impl Future<Output = Result<User, RepositoryError>> + Send;

    /// Persist a cart if the stored version still equals `expected_version`.
    ///
    /// Returns the new version. A stale version yields
    /// `RepositoryError::Conflict` and leaves storage untouched.
    fn save_cart(
        &self,
        user_id: UserId,
        cart: &Cart,
        expected_version: i32,
    ) -> impl Future<Output = Result<i32, RepositoryError>> + Send;

    /// Users whose cart has a line for `product_id`.
    fn users_with_product_in_cart(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<User>, RepositoryError>> + Send;

    /// Store a pending password reset, replacing any previous one.
    fn set_password_reset(
        &self,
        user_id: UserId,
        reset: &PasswordReset,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// The user holding `token`, if it has not expired at `now`.
    fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Replace the password hash and clear the reset token.
    ///
    /// Succeeds only while `token` belongs to `user_id` and is unexpired;
    /// otherwise returns `RepositoryError::NotFound`.
    fn reset_password(
        &self,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Append-only order storage.
pub trait OrderStore: Send + Sync {
    /// Insert `order` and reset its user's cart to empty, atomically.
    ///
    /// The cart is only reset if its stored version equals
    /// `expected_cart_version`; otherwise nothing is written and
    /// `RepositoryError::Conflict` is returned. An order naming a checkout
    /// session that already paid for another order is also a `Conflict`. On
    /// success returns the new order ID and the cart's new version.
    fn create_order_and_clear_cart(
        &self,
        order: &NewOrder,
        expected_cart_version: i32,
    ) -> impl Future<Output = Result<(OrderId, i32), RepositoryError>> + Send;

    /// All orders placed by `user_id`, newest first.
    fn orders_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// The order paid for by a payment session, if one was placed.
    fn order_for_checkout_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<OrderId>, RepositoryError>> + Send;

    /// Look up an order by ID.
    fn get_order(
        &self,
        id: OrderId,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-violation into `RepositoryError::Conflict`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
