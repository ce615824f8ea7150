//! Orders and the product snapshots they are built from.
//!
//! An order is created once from a cart and never changes afterwards. Its
//! items hold copies of the product fields taken at checkout time, so editing
//! or deleting a product later leaves order history untouched.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::Cart;
use super::id::{OrderId, ProductId, UserId};
use super::price::Price;
use super::product::Product;

/// Errors building an order from a cart.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The cart has no lines.
    #[error("cart is empty")]
    EmptyCart,
    /// A cart line references a product that could not be resolved.
    #[error("product {0} not found")]
    MissingProduct(ProductId),
}

/// A frozen copy of a product's fields at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub title: String,
    pub price: Price,
    pub description: String,
    pub image_path: String,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            price: product.price,
            description: product.description.clone(),
            image_path: product.image_path.clone(),
        }
    }
}

/// One ordered product and its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: ProductSnapshot,
    pub quantity: NonZeroU32,
}

impl OrderItem {
    /// Snapshot price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price.times(self.quantity.get())
    }
}

/// An order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub user_name: String,
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    /// Payment session that paid for the order; each pays for at most one.
    pub checkout_session: Option<String>,
}

impl NewOrder {
    /// Snapshot a cart into an order.
    ///
    /// Items follow the cart's line order. Each line is paired with the
    /// product resolved by `resolve` and keeps the line's unit price, which is
    /// what the customer was charged. The total is copied from the cart's
    /// cached total rather than recomputed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::EmptyCart` for a cart without lines and
    /// `SnapshotError::MissingProduct` if any line cannot be resolved.
    pub fn from_cart<'p>(
        user_id: UserId,
        user_name: &str,
        cart: &Cart,
        mut resolve: impl FnMut(ProductId) -> Option<&'p Product>,
    ) -> Result<Self, SnapshotError> {
        if cart.is_empty() {
            return Err(SnapshotError::EmptyCart);
        }

        let items = cart
            .lines()
            .iter()
            .map(|line| {
                let product = resolve(line.product_id())
                    .ok_or(SnapshotError::MissingProduct(line.product_id()))?;
                let quantity = NonZeroU32::new(line.quantity())
                    .ok_or(SnapshotError::MissingProduct(line.product_id()))?;
                Ok(OrderItem {
                    product: ProductSnapshot {
                        price: line.unit_price(),
                        ..ProductSnapshot::from(product)
                    },
                    quantity,
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?;

        Ok(Self {
            user_id,
            user_name: user_name.to_owned(),
            items,
            total_price: cart.total_price(),
            checkout_session: None,
        })
    }

    /// Record the payment session that paid for this order.
    #[must_use]
    pub fn paid_by(mut self, session_id: impl Into<String>) -> Self {
        self.checkout_session = Some(session_id.into());
        self
    }
}

/// Whether a user may see an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

/// A persisted, immutable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub user_name: String,
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Access is granted only to the user who placed the order.
    #[must_use]
    pub fn access_for(&self, requester: UserId) -> Access {
        if self.user_id == requester {
            Access::Granted
        } else {
            Access::Denied
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: i32, title: &str, price: &str) -> Product {
        Product {
            id: ProductId::new(id),
            title: title.to_string(),
            price: Price::parse(price).unwrap(),
            description: format!("{title} description"),
            image_path: format!("{id}.png"),
            owner_id: UserId::new(100),
        }
    }

    #[test]
    fn test_from_cart_snapshots_in_cart_order() {
        let p1 = product(1, "Lamp", "10");
        let p2 = product(2, "Rug", "5");
        let mut cart = Cart::empty();
        cart.add_product(p1.id, p1.price).unwrap();
        cart.add_product(p2.id, p2.price).unwrap();
        cart.add_product(p1.id, p1.price).unwrap();

        let catalog = [p1.clone(), p2.clone()];
        let order = NewOrder::from_cart(UserId::new(5), "Ada", &cart, |id| {
            catalog.iter().find(|p| p.id == id)
        })
        .unwrap();

        assert_eq!(order.total_price, Decimal::from(25));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product, ProductSnapshot::from(&p1));
        assert_eq!(order.items[0].quantity.get(), 2);
        assert_eq!(order.items[1].product.title, "Rug");
        assert_eq!(order.items[1].line_total(), Decimal::from(5));
        assert_eq!(order.checkout_session, None);
        assert_eq!(
            order.paid_by("cs_1").checkout_session.as_deref(),
            Some("cs_1")
        );
    }

    #[test]
    fn test_items_keep_price_charged_in_cart() {
        let mut lamp = product(1, "Lamp", "10");
        let mut cart = Cart::empty();
        cart.add_product(lamp.id, lamp.price).unwrap();
        lamp.price = Price::parse("15").unwrap();

        let order =
            NewOrder::from_cart(UserId::new(5), "Ada", &cart, |_| Some(&lamp)).unwrap();
        assert_eq!(order.items[0].product.price.to_string(), "10.00");
        assert_eq!(order.items[0].line_total(), order.total_price);
    }

    #[test]
    fn test_from_cart_rejects_empty_cart() {
        let result = NewOrder::from_cart(UserId::new(1), "Ada", &Cart::empty(), |_| None);
        assert_eq!(result, Err(SnapshotError::EmptyCart));
    }

    #[test]
    fn test_from_cart_reports_missing_product() {
        let mut cart = Cart::empty();
        cart.add_product(ProductId::new(9), Price::parse("1").unwrap())
            .unwrap();
        let result = NewOrder::from_cart(UserId::new(1), "Ada", &cart, |_| None);
        assert_eq!(result, Err(SnapshotError::MissingProduct(ProductId::new(9))));
    }

    #[test]
    fn test_snapshot_is_independent_of_product() {
        let mut p = product(1, "Lamp", "10");
        let snapshot = ProductSnapshot::from(&p);
        p.title = "Renamed".to_string();
        p.price = Price::parse("99").unwrap();
        assert_eq!(snapshot.title, "Lamp");
        assert_eq!(snapshot.price.to_string(), "10.00");
    }

    #[test]
    fn test_access_only_for_owner() {
        let order = Order {
            id: OrderId::new(1),
            user_id: UserId::new(1),
            user_name: "Ada".to_string(),
            items: Vec::new(),
            total_price: Decimal::ZERO,
            checkout_session_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(order.access_for(UserId::new(1)), Access::Granted);
        assert_eq!(order.access_for(UserId::new(2)), Access::Denied);
    }
}
