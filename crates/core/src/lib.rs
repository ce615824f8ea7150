//! Emporium Core - Shared domain types.
//!
//! This crate provides the domain types used across all Emporium components:
//! - `storefront` - Public-facing shop, cart, checkout and product admin
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O, no
//! database access, no HTTP clients. The cart's cached total is maintained
//! here and nowhere else, so every mutation goes through [`Cart`]'s methods.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, prices, products, carts and orders

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
