//! Cart Manager: every write to a user's cart goes through here.
//!
//! Each operation mutates a copy of the user's cart, persists it with an
//! optimistic version check, and only then replaces the in-memory cart. A
//! failed write leaves the caller's `User` exactly as it was.

use thiserror::Error;
use tracing::instrument;

use emporium_core::{Cart, CartError, Product, ProductId};

use crate::db::{RepositoryError, UserStore};
use crate::models::User;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    /// The mutation itself was rejected.
    #[error("invalid cart update: {0}")]
    Validation(#[from] CartError),

    /// The cart changed in storage since it was loaded.
    #[error("cart was modified concurrently")]
    Conflict,

    /// Persisting the cart failed.
    #[error("storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for CartServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => Self::Conflict,
            other => Self::Storage(other),
        }
    }
}

/// How many times a purge re-reads a cart that keeps changing underneath it.
const PURGE_ATTEMPTS: usize = 5;

/// Cart operations over a [`UserStore`].
pub struct CartService<'a, U> {
    users: &'a U,
}

impl<'a, U: UserStore> CartService<'a, U> {
    /// Create a cart service.
    #[must_use]
    pub const fn new(users: &'a U) -> Self {
        Self { users }
    }

    /// Add one unit of `product` to the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Conflict` if the stored cart moved on since
    /// `user` was loaded, or `Storage` if the write fails.
    #[instrument(skip(self, user, product), fields(user_id = %user.id, product_id = %product.id))]
    pub async fn add_to_cart(
        &self,
        user: &mut User,
        product: &Product,
    ) -> Result<(), CartServiceError> {
        let mut cart = user.cart.clone();
        cart.add_product(product.id, product.price)?;
        self.persist(user, cart).await
    }

    /// Remove the whole line for `product_id`, crediting its line total.
    ///
    /// Works whether or not the product is still in the catalog. Returns
    /// `false` without touching storage when the product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Conflict` or `Storage` if the write fails.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn remove_from_cart(
        &self,
        user: &mut User,
        product_id: ProductId,
    ) -> Result<bool, CartServiceError> {
        let mut cart = user.cart.clone();
        if cart.remove_product(product_id).is_none() {
            return Ok(false);
        }
        self.persist(user, cart).await?;
        Ok(true)
    }

    /// Remove a single unit of `product_id`, crediting the line's unit price.
    ///
    /// Returns the remaining quantity (0 once the line is gone), or `None`
    /// without touching storage when the product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Conflict` or `Storage` if the write fails.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn decrement_in_cart(
        &self,
        user: &mut User,
        product_id: ProductId,
    ) -> Result<Option<u32>, CartServiceError> {
        let mut cart = user.cart.clone();
        let Some(remaining) = cart.decrement_product(product_id) else {
            return Ok(None);
        };
        self.persist(user, cart).await?;
        Ok(Some(remaining))
    }

    /// Remove `product_id` from every cart that holds it.
    ///
    /// Used when a product leaves the catalog. A cart that changes between
    /// the listing and the write is re-read and retried, so no cart is left
    /// holding the product. Returns how many carts were updated.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Storage` if the affected users cannot be
    /// listed or a write fails, and `Conflict` if one cart is still changing
    /// after every retry.
    #[instrument(skip(self))]
    pub async fn purge_product(&self, product_id: ProductId) -> Result<usize, CartServiceError> {
        let holders = self.users.users_with_product_in_cart(product_id).await?;
        let mut updated = 0;

        for holder in holders {
            if self.purge_from(holder, product_id).await? {
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn purge_from(
        &self,
        mut holder: User,
        product_id: ProductId,
    ) -> Result<bool, CartServiceError> {
        for attempt in 1..=PURGE_ATTEMPTS {
            match self.remove_from_cart(&mut holder, product_id).await {
                Err(CartServiceError::Conflict) => {
                    tracing::debug!(user_id = %holder.id, attempt, "Cart changed while purging product, reloading");
                    match self.users.get_user(holder.id).await? {
                        Some(fresh) => holder = fresh,
                        None => return Ok(false),
                    }
                }
                other => return other,
            }
        }

        tracing::warn!(user_id = %holder.id, "Cart kept changing while purging product");
        Err(CartServiceError::Conflict)
    }

    async fn persist(&self, user: &mut User, cart: Cart) -> Result<(), CartServiceError> {
        let version = self
            .users
            .save_cart(user.id, &cart, user.cart_version)
            .await?;
        user.cart = cart;
        user.cart_version = version;
        Ok(())
    }
}
