//! Order Service: turns a cart into an immutable order.

use thiserror::Error;
use tracing::instrument;

use emporium_core::{Access, NewOrder, Order, OrderId, ProductId, SnapshotError, UserId};

use super::payments::CheckoutSessionStatus;
use crate::db::{CatalogStore, OrderStore, RepositoryError};
use crate::models::User;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Orders cannot be placed from an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart line references a product that is no longer in the catalog.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The order belongs to another user.
    #[error("order {0} belongs to another user")]
    Unauthorized(OrderId),

    /// The checkout session already paid for an order.
    #[error("checkout session {0} was already used")]
    SessionUsed(String),

    /// The checkout session was not paid, or paid a different amount than
    /// the cart now totals.
    #[error("checkout session {0} does not cover the cart")]
    PaymentMismatch(String),

    /// The cart changed in storage since it was loaded; nothing was written.
    #[error("cart was modified concurrently")]
    Conflict,

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => Self::Conflict,
            other => Self::Storage(other),
        }
    }
}

impl From<SnapshotError> for OrderError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::EmptyCart => Self::EmptyCart,
            SnapshotError::MissingProduct(id) => Self::ProductNotFound(id),
        }
    }
}

/// Order operations over a catalog and an order store.
pub struct OrderService<'a, C, O> {
    catalog: &'a C,
    orders: &'a O,
}

impl<'a, C: CatalogStore, O: OrderStore> OrderService<'a, C, O> {
    /// Create an order service.
    #[must_use]
    pub const fn new(catalog: &'a C, orders: &'a O) -> Self {
        Self { catalog, orders }
    }

    /// Snapshot the user's cart into a new order and empty the cart.
    ///
    /// The order insert and the cart reset happen in one storage
    /// transaction, guarded by the user's cart version. On success the
    /// in-memory cart is cleared too.
    ///
    /// # Errors
    ///
    /// - `OrderError::EmptyCart` if the cart has no lines
    /// - `OrderError::ProductNotFound` if a line's product was deleted
    /// - `OrderError::Conflict` if the cart changed since `user` was loaded
    /// - `OrderError::Storage` for other storage failures
    ///
    /// Nothing is written in any error case.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn place_order(&self, user: &mut User) -> Result<OrderId, OrderError> {
        self.place(user, None).await
    }

    /// Place the order paid for by a Stripe Checkout Session.
    ///
    /// Same as [`place_order`](Self::place_order), except that the session
    /// must be paid, must have charged exactly the cart's total, and must not
    /// have paid for an earlier order. The session ID is stored on the order,
    /// so reusing it fails even when two requests race.
    ///
    /// # Errors
    ///
    /// - `OrderError::SessionUsed` if an order already names this session
    /// - `OrderError::PaymentMismatch` if the session is unpaid or its amount
    ///   differs from the cart total
    /// - any error from [`place_order`](Self::place_order)
    #[instrument(skip(self, user, session), fields(user_id = %user.id, session_id = %session.id))]
    pub async fn place_paid_order(
        &self,
        user: &mut User,
        session: &CheckoutSessionStatus,
    ) -> Result<OrderId, OrderError> {
        if self
            .orders
            .order_for_checkout_session(&session.id)
            .await?
            .is_some()
        {
            return Err(OrderError::SessionUsed(session.id.clone()));
        }
        if user.cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if !session.is_paid() || !session.charged_for(&user.cart) {
            tracing::warn!(
                amount_total = ?session.amount_total,
                cart_total = %user.cart.total_price(),
                "Checkout session does not cover the cart"
            );
            return Err(OrderError::PaymentMismatch(session.id.clone()));
        }

        self.place(user, Some(&session.id)).await
    }

    async fn place(
        &self,
        user: &mut User,
        checkout_session: Option<&str>,
    ) -> Result<OrderId, OrderError> {
        if user.cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut products = Vec::with_capacity(user.cart.lines().len());
        for line in user.cart.lines() {
            let product = self
                .catalog
                .get_product(line.product_id())
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id()))?;
            products.push(product);
        }

        let mut order = NewOrder::from_cart(user.id, &user.name, &user.cart, |id| {
            products.iter().find(|p| p.id == id)
        })?;
        if let Some(session_id) = checkout_session {
            order = order.paid_by(session_id);
        }

        let placed = self
            .orders
            .create_order_and_clear_cart(&order, user.cart_version)
            .await;
        let (order_id, cart_version) = match (placed, checkout_session) {
            (Ok(placed), _) => placed,
            // A concurrent request may have placed the order for this session
            (Err(RepositoryError::Conflict(msg)), Some(session_id)) => {
                if self
                    .orders
                    .order_for_checkout_session(session_id)
                    .await?
                    .is_some()
                {
                    return Err(OrderError::SessionUsed(session_id.to_string()));
                }
                return Err(RepositoryError::Conflict(msg).into());
            }
            (Err(e), _) => return Err(e.into()),
        };

        user.cart.clear();
        user.cart_version = cart_version;

        tracing::info!(
            order_id = %order_id,
            items = order.items.len(),
            total = %order.total_price,
            "Order placed"
        );
        Ok(order_id)
    }

    /// All orders placed by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Storage` if the query fails.
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.orders_for_user(user_id).await?)
    }

    /// Fetch an order for invoicing, checking that `requester` owns it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` for an unknown ID and
    /// `OrderError::Unauthorized` when another user placed the order.
    #[instrument(skip(self))]
    pub async fn invoice_order(
        &self,
        order_id: OrderId,
        requester: UserId,
    ) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        match authorize_order_access(&order, requester) {
            Access::Granted => Ok(order),
            Access::Denied => Err(OrderError::Unauthorized(order_id)),
        }
    }
}

/// Whether `requester` may see `order`. Denied whenever the IDs differ.
#[must_use]
pub fn authorize_order_access(order: &Order, requester: UserId) -> Access {
    order.access_for(requester)
}
