//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Cart Manager (add, remove, decrement, purge)
//! - `orders` - Order Service (place, list, authorize)
//! - `auth` - Signup, login and password reset
//! - `payments` - Stripe Checkout sessions
//! - `email` - Transactional email over SMTP
//! - `invoice` - PDF invoices
//! - `uploads` - Product image storage

pub mod auth;
pub mod cart;
pub mod email;
pub mod invoice;
pub mod orders;
pub mod payments;
pub mod uploads;

pub use auth::{AuthError, AuthService};
pub use cart::{CartService, CartServiceError};
pub use email::{EmailError, EmailService};
pub use invoice::InvoiceError;
pub use orders::{OrderError, OrderService};
pub use payments::{PaymentClient, PaymentError};
pub use uploads::UploadError;
