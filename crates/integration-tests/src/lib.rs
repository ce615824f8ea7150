//! Integration tests for Emporium.
//!
//! The storefront services are generic over the store traits in
//! `emporium_storefront::db`. This crate provides [`MemoryStore`], one
//! in-memory implementation of all three, so cart and order flows can be
//! exercised end to end without a database.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p emporium-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_lifecycle` - Cart Manager against a shared store
//! - `order_lifecycle` - Order placement, paid checkout, history and access control
//! - `catalog_removal` - Deleting a product from the catalog, carts and disk
//! - `accounts` - Signup, login and password reset

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use emporium_core::{
    Cart, Email, NewOrder, Order, OrderId, Price, Product, ProductId, UserId,
};
use emporium_storefront::db::{CatalogStore, OrderStore, RepositoryError, UserStore};
use emporium_storefront::models::{NewProduct, PasswordReset, User};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
    reset: Option<PasswordReset>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, StoredUser>,
    products: HashMap<ProductId, Product>,
    orders: Vec<Order>,
    next_id: i32,
    fail_writes: bool,
    stale_listings: bool,
    writes: usize,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    /// Count a write, or fail it when failure injection is on.
    fn write(&mut self) -> Result<(), RepositoryError> {
        if self.fail_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.writes += 1;
        Ok(())
    }

    fn stored_user(&mut self, id: UserId) -> Result<&mut StoredUser, RepositoryError> {
        self.users.get_mut(&id).ok_or(RepositoryError::NotFound)
    }
}

/// In-memory catalog, user and order storage.
///
/// Mirrors the `PostgreSQL` repositories: cart writes are version checked
/// and order creation resets the cart atomically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make every following write fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make `users_with_product_in_cart` return copies one cart version
    /// behind storage, as if each cart changed right after being listed.
    pub fn stale_listings(&self, stale: bool) {
        self.lock().stale_listings = stale;
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// The stored copy of a user, bypassing any caller's in-memory value.
    #[must_use]
    pub fn stored_user(&self, id: UserId) -> Option<User> {
        self.lock().users.get(&id).map(|s| s.user.clone())
    }

    /// All stored orders, in insertion order.
    #[must_use]
    pub fn all_orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    /// Insert a user with an empty cart directly.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn seed_user(&self, name: &str, email: &str) -> User {
        let mut state = self.lock();
        let id = UserId::new(state.next_id());
        let user = User {
            id,
            name: name.to_string(),
            email: Email::parse(email).expect("test email is valid"),
            cart: Cart::empty(),
            cart_version: 0,
            created_at: Utc::now(),
        };
        state.users.insert(
            id,
            StoredUser {
                user: user.clone(),
                password_hash: String::new(),
                reset: None,
            },
        );
        user
    }

    /// Insert a product directly.
    ///
    /// # Panics
    ///
    /// Panics if `price` is not a valid price.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn seed_product(&self, title: &str, price: &str, owner: UserId) -> Product {
        let mut state = self.lock();
        let id = ProductId::new(state.next_id());
        let product = Product {
            id,
            title: title.to_string(),
            price: Price::parse(price).expect("test price is valid"),
            description: format!("{title} description"),
            image_path: format!("{}.png", id.as_i32()),
            owner_id: owner,
        };
        state.products.insert(id, product.clone());
        product
    }
}

impl CatalogStore for MemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn list_products(&self, offset: u64, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self.lock().products.values().cloned().collect();
        products.sort_by_key(|p| p.id.as_i32());
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(products.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_products(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().products.len() as u64)
    }

    async fn products_by_owner(&self, owner: UserId) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .lock()
            .products
            .values()
            .filter(|p| p.is_owned_by(owner))
            .cloned()
            .collect();
        products.sort_by_key(|p| p.id.as_i32());
        Ok(products)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.lock();
        state.write()?;
        let id = ProductId::new(state.next_id());
        let created = Product {
            id,
            title: product.title.clone(),
            price: product.price,
            description: product.description.clone(),
            image_path: product.image_path.clone(),
            owner_id: product.owner_id,
        };
        state.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state.write()?;
        match state.products.get_mut(&product.id) {
            Some(stored) if stored.owner_id == product.owner_id => {
                *stored = product.clone();
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn delete_product(&self, id: ProductId, owner: UserId) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        state.write()?;
        if state.products.get(&id).is_some_and(|p| p.is_owned_by(owner)) {
            state.products.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}

impl UserStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.stored_user(id))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|s| &s.user.email == email)
            .map(|s| s.user.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|s| &s.user.email == email)
            .map(|s| (s.user.clone(), s.password_hash.clone())))
    }

    async fn create_user(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        if state.users.values().any(|s| &s.user.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_string()));
        }
        state.write()?;
        let id = UserId::new(state.next_id());
        let user = User {
            id,
            name: name.to_string(),
            email: email.clone(),
            cart: Cart::empty(),
            cart_version: 0,
            created_at: Utc::now(),
        };
        state.users.insert(
            id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
                reset: None,
            },
        );
        Ok(user)
    }

    async fn save_cart(
        &self,
        user_id: UserId,
        cart: &Cart,
        expected_version: i32,
    ) -> Result<i32, RepositoryError> {
        let mut state = self.lock();
        let stored = state.stored_user(user_id)?;
        if stored.user.cart_version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "cart for user {user_id} changed since version {expected_version}"
            )));
        }
        state.write()?;
        let stored = state.stored_user(user_id)?;
        stored.user.cart = cart.clone();
        stored.user.cart_version += 1;
        Ok(stored.user.cart_version)
    }

    async fn users_with_product_in_cart(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<User>, RepositoryError> {
        let state = self.lock();
        let lag = i32::from(state.stale_listings);
        Ok(state
            .users
            .values()
            .filter(|s| s.user.cart.line(product_id).is_some())
            .map(|s| User {
                cart_version: s.user.cart_version - lag,
                ..s.user.clone()
            })
            .collect())
    }

    async fn set_password_reset(
        &self,
        user_id: UserId,
        reset: &PasswordReset,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state.write()?;
        state.stored_user(user_id)?.reset = Some(reset.clone());
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|s| {
                s.reset
                    .as_ref()
                    .is_some_and(|r| r.token == token && r.is_valid_at(now))
            })
            .map(|s| s.user.clone()))
    }

    async fn reset_password(
        &self,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let valid = state
            .stored_user(user_id)?
            .reset
            .as_ref()
            .is_some_and(|r| r.token == token && r.is_valid_at(now));
        if !valid {
            return Err(RepositoryError::NotFound);
        }
        state.write()?;
        let stored = state.stored_user(user_id)?;
        stored.password_hash = password_hash.to_string();
        stored.reset = None;
        Ok(())
    }
}

impl OrderStore for MemoryStore {
    async fn create_order_and_clear_cart(
        &self,
        order: &NewOrder,
        expected_cart_version: i32,
    ) -> Result<(OrderId, i32), RepositoryError> {
        let mut state = self.lock();
        if state.stored_user(order.user_id)?.user.cart_version != expected_cart_version {
            return Err(RepositoryError::Conflict(format!(
                "cart for user {} changed since version {expected_cart_version}",
                order.user_id
            )));
        }
        if let Some(session_id) = &order.checkout_session
            && state
                .orders
                .iter()
                .any(|o| o.checkout_session_id.as_ref() == Some(session_id))
        {
            return Err(RepositoryError::Conflict(
                "order for this checkout session already exists".to_string(),
            ));
        }
        // One write for the whole transaction
        state.write()?;

        let id = OrderId::new(state.next_id());
        state.orders.push(Order {
            id,
            user_id: order.user_id,
            user_name: order.user_name.clone(),
            items: order.items.clone(),
            total_price: order.total_price,
            checkout_session_id: order.checkout_session.clone(),
            created_at: Utc::now(),
        });

        let stored = state.stored_user(order.user_id)?;
        stored.user.cart.clear();
        stored.user.cart_version += 1;
        Ok((id, stored.user.cart_version))
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        // Insertion order is creation order; newest first
        Ok(self
            .lock()
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn order_for_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.checkout_session_id.as_deref() == Some(session_id))
            .map(|o| o.id))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.lock().orders.iter().find(|o| o.id == id).cloned())
    }
}
