//! Order repository for database operations.
//!
//! Orders are append-only: there is no update or delete.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use emporium_core::{Cart, NewOrder, Order, OrderId, OrderItem, UserId};

use super::{OrderStore, RepositoryError, conflict_on_unique};

const ORDER_COLUMNS: &str =
    "id, user_id, user_name, items, total_price, checkout_session_id, created_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    user_name: String,
    items: Json<Vec<OrderItem>>,
    total_price: Decimal,
    checkout_session_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            items: row.items.0,
            total_price: row.total_price,
            checkout_session_id: row.checkout_session_id,
            created_at: row.created_at,
        }
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for OrderRepository<'_> {
    async fn create_order_and_clear_cart(
        &self,
        order: &NewOrder,
        expected_cart_version: i32,
    ) -> Result<(OrderId, i32), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Reset the cart first so a stale version aborts before the insert
        let cart_version: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.user
            SET cart = $2, cart_version = cart_version + 1, updated_at = now()
            WHERE id = $1 AND cart_version = $3
            RETURNING cart_version
            ",
        )
        .bind(order.user_id)
        .bind(Json(Cart::empty()))
        .bind(expected_cart_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(cart_version) = cart_version else {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "cart for user {} changed since version {expected_cart_version}",
                order.user_id
            )));
        };

        let order_id: OrderId = sqlx::query_scalar(
            r#"
            INSERT INTO storefront."order"
                (user_id, user_name, items, total_price, checkout_session_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(order.user_id)
        .bind(&order.user_name)
        .bind(Json(&order.items))
        .bind(order.total_price)
        .bind(order.checkout_session.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "order for this checkout session"))?;

        tx.commit().await?;

        Ok((order_id, cart_version))
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order"
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn order_for_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar(
            r#"SELECT id FROM storefront."order" WHERE checkout_session_id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(id)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM storefront."order" WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Order::from))
    }
}
