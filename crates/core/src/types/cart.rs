//! The shopping cart embedded in every user.
//!
//! A cart is a list of `(product, quantity, unit price)` lines plus a cached
//! total. Each line remembers the price it was last added at, so a line can
//! be credited back without consulting the catalog, which matters once the
//! product has been deleted. The fields are private so that the methods
//! below are the only place the `total == Σ quantity × unit_price`
//! invariant can be broken.

use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// Errors from cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Incrementing the line would overflow its quantity.
    #[error("quantity for product {0} cannot be increased further")]
    QuantityOverflow(ProductId),
}

/// One `(product, quantity)` pair inside a cart.
///
/// The quantity is never zero; a line that would reach zero is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    product_id: ProductId,
    quantity: NonZeroU32,
    unit_price: Price,
}

impl CartLine {
    /// The referenced product.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Units of the product in the cart (always at least 1).
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    /// Price per unit when the line was last added to.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        self.unit_price
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.times(self.quantity())
    }
}

/// A user's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    total_price: Decimal,
}

impl Cart {
    /// An empty cart: no lines, zero total.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The cached total price.
    #[must_use]
    pub const fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// The total in minor currency units, as payment providers count it.
    ///
    /// Returns `None` if it does not fit in an `i64`.
    #[must_use]
    pub fn total_minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        (self.total_price * Decimal::ONE_HUNDRED).to_i64()
    }

    /// Whether the cached total equals the sum of the line totals.
    ///
    /// Always true for carts built through the methods below; a stored cart
    /// that fails this was edited outside of them.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.lines.iter().map(CartLine::line_total).sum::<Decimal>() == self.total_price
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(CartLine::quantity).sum()
    }

    /// The line for `product_id`, if any.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Add one unit of a product at `price`.
    ///
    /// Increments the existing line by exactly one, or appends a new line
    /// with quantity one. The line takes `price` as its unit price; when the
    /// product was repriced since the line was last touched, the whole line
    /// moves to the new price and the total follows.
    ///
    /// # Errors
    ///
    /// Returns `CartError::QuantityOverflow` if the line is already at
    /// `u32::MAX`; the cart is left unchanged.
    pub fn add_product(&mut self, product_id: ProductId, price: Price) -> Result<(), CartError> {
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                let quantity = line
                    .quantity
                    .checked_add(1)
                    .ok_or(CartError::QuantityOverflow(product_id))?;
                self.total_price += price.times(quantity.get()) - line.line_total();
                line.quantity = quantity;
                line.unit_price = price;
            }
            None => {
                self.lines.push(CartLine {
                    product_id,
                    quantity: NonZeroU32::MIN,
                    unit_price: price,
                });
                self.total_price += price.amount();
            }
        }
        Ok(())
    }

    /// Remove a product's whole line, crediting back its line total.
    ///
    /// Returns the removed line, or `None` (leaving the cart untouched) when
    /// the product is not in the cart.
    pub fn remove_product(&mut self, product_id: ProductId) -> Option<CartLine> {
        let idx = self.lines.iter().position(|l| l.product_id == product_id)?;
        let line = self.lines.remove(idx);
        self.total_price -= line.line_total();
        Some(line)
    }

    /// Remove a single unit of a product, crediting back its unit price.
    ///
    /// A line at quantity one is removed entirely. Returns the remaining
    /// quantity, or `None` when the product is not in the cart.
    pub fn decrement_product(&mut self, product_id: ProductId) -> Option<u32> {
        let idx = self.lines.iter().position(|l| l.product_id == product_id)?;
        let line = *self.lines.get(idx)?;
        self.total_price -= line.unit_price.amount();
        match NonZeroU32::new(line.quantity() - 1) {
            Some(quantity) => {
                if let Some(stored) = self.lines.get_mut(idx) {
                    stored.quantity = quantity;
                }
                Some(quantity.get())
            }
            None => {
                self.lines.remove(idx);
                Some(0)
            }
        }
    }

    /// Reset to the empty cart.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.total_price = Decimal::ZERO;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn price(s: &str) -> Price {
        Price::parse(s).unwrap()
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::empty();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Decimal::ZERO);
        assert_eq!(cart.item_count(), 0);
        assert!(cart.is_consistent());
    }

    #[test]
    fn test_adding_same_product_twice_merges_lines() {
        let mut cart = Cart::empty();
        let p1 = ProductId::new(1);
        cart.add_product(p1, price("10")).unwrap();
        cart.add_product(p1, price("10")).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.line(p1).unwrap().quantity(), 2);
        assert_eq!(cart.total_price(), Decimal::from(20));
    }

    #[test]
    fn test_total_tracks_sum_of_lines() {
        let mut cart = Cart::empty();
        let adds = [(1, "10.00"), (2, "5.25"), (1, "10.00"), (3, "0.99"), (2, "5.25")];
        for (id, p) in adds {
            cart.add_product(ProductId::new(id), price(p)).unwrap();
            assert!(cart.is_consistent());
        }

        let expected: Decimal = [(2, "10.00"), (2, "5.25"), (1, "0.99")]
            .iter()
            .map(|(q, p)| price(p).times(*q))
            .sum();
        assert_eq!(cart.total_price(), expected);
        assert_eq!(cart.item_count(), 5);
        // Insertion order is kept
        let ids: Vec<i32> = cart.lines().iter().map(|l| l.product_id().as_i32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_repriced_product_moves_whole_line() {
        let mut cart = Cart::empty();
        let p1 = ProductId::new(1);
        cart.add_product(p1, price("10")).unwrap();
        cart.add_product(p1, price("12")).unwrap();

        assert_eq!(cart.line(p1).unwrap().unit_price(), price("12"));
        assert_eq!(cart.total_price(), Decimal::from(24));
        assert_eq!(cart.total_minor_units(), Some(2400));
        assert!(cart.is_consistent());
    }

    #[test]
    fn test_remove_missing_product_is_noop() {
        let mut cart = Cart::empty();
        cart.add_product(ProductId::new(1), price("3")).unwrap();
        let before = cart.clone();

        assert!(cart.remove_product(ProductId::new(99)).is_none());
        assert_eq!(cart, before);
    }

    #[test]
    fn test_remove_deletes_whole_line_and_credits_quantity() {
        let mut cart = Cart::empty();
        let p1 = ProductId::new(1);
        let p2 = ProductId::new(2);
        cart.add_product(p1, price("10")).unwrap();
        cart.add_product(p1, price("10")).unwrap();
        cart.add_product(p2, price("5")).unwrap();

        let removed = cart.remove_product(p1).unwrap();
        assert_eq!(removed.quantity(), 2);
        assert!(cart.line(p1).is_none());
        assert_eq!(cart.total_price(), Decimal::from(5));

        // Second removal is a no-op
        assert!(cart.remove_product(p1).is_none());
        assert_eq!(cart.total_price(), Decimal::from(5));
    }

    #[test]
    fn test_decrement_reduces_then_removes() {
        let mut cart = Cart::empty();
        let p1 = ProductId::new(1);
        cart.add_product(p1, price("4")).unwrap();
        cart.add_product(p1, price("4")).unwrap();

        assert_eq!(cart.decrement_product(p1), Some(1));
        assert_eq!(cart.total_price(), Decimal::from(4));
        assert_eq!(cart.decrement_product(p1), Some(0));
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Decimal::ZERO);
        assert_eq!(cart.decrement_product(p1), None);
    }

    #[test]
    fn test_clear_resets_total() {
        let mut cart = Cart::empty();
        cart.add_product(ProductId::new(1), price("7")).unwrap();
        cart.clear();
        assert_eq!(cart, Cart::empty());
    }

    #[test]
    fn test_zero_quantity_rejected_on_deserialize() {
        let json = r#"{"lines":[{"product_id":1,"quantity":0,"unit_price":"2"}],"total_price":"0"}"#;
        assert!(serde_json::from_str::<Cart>(json).is_err());
    }

    #[test]
    fn test_hand_edited_total_is_detected() {
        let json = r#"{"lines":[{"product_id":1,"quantity":2,"unit_price":"2.50"}],"total_price":"4"}"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert!(!cart.is_consistent());
    }
}
