//! Core types for Emporium.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod product;

pub use cart::{Cart, CartError, CartLine};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Access, NewOrder, Order, OrderItem, ProductSnapshot, SnapshotError};
pub use price::{Price, PriceError};
pub use product::Product;
