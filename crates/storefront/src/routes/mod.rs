//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Product index (paginated)
//! GET  /products                  - Product list (paginated)
//! GET  /products/{id}             - Product detail
//!
//! # Cart (requires auth)
//! GET  /cart                      - Cart page
//! POST /cart                      - Add one unit of a product
//! POST /cart/delete-item          - Remove a product's whole line
//! POST /cart/decrement-item       - Remove one unit
//!
//! # Checkout and orders (requires auth)
//! GET  /checkout                  - Create a Stripe session, show summary
//! GET  /checkout/success          - Place the order once Stripe reports payment
//! GET  /checkout/cancel           - Back to checkout
//! POST /create-order              - Place the order directly
//! GET  /orders                    - Order history
//! GET  /orders/{id}/invoice       - PDF invoice (owner only)
//!
//! # Auth
//! GET|POST /login, POST /logout, GET|POST /signup
//! GET|POST /reset                 - Request a password reset link
//! GET|POST /new-password/{token}  - Set a new password
//!
//! # Product administration (requires auth)
//! GET  /admin/products
//! GET|POST /admin/add-product
//! GET  /admin/edit-product/{id}, POST /admin/edit-product
//! POST /admin/delete-product
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod shop;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
    routing::{get, post},
};

use crate::error::AppError;
use crate::middleware::{CsrfToken, OptionalAuth, auth_rate_limiter, cart_rate_limiter};
use crate::models::{CurrentUser, User};
use crate::state::AppState;

/// Largest accepted multipart body for product forms.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Data every page layout needs: who is logged in and the form token.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub csrf_token: String,
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = <CsrfToken as FromRequestParts<S>>::Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(OptionalAuth(user)) = OptionalAuth::from_request_parts(parts, state).await;
        let CsrfToken(csrf_token) = CsrfToken::from_request_parts(parts, state).await?;
        Ok(Self { user, csrf_token })
    }
}

/// Load the full user row (with cart) for the session's user.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the account no longer exists.
pub async fn load_user(state: &AppState, current: &CurrentUser) -> Result<User, AppError> {
    use crate::db::UserStore;

    state
        .users()
        .get_user(current.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_string()))
}

/// Human-readable text for a `?error=` or `?success=` code.
#[must_use]
pub fn message_for(code: &str) -> &'static str {
    match code {
        "registered" => "Account created, you can log in now.",
        "reset_sent" => "Check your inbox for a link to reset your password.",
        "password_reset" => "Your password was updated, you can log in now.",
        "unpaid" => "Your payment has not been completed yet.",
        "cart_changed" => "Your cart changed after payment started, please check out again.",
        "product_saved" => "Product saved.",
        "product_deleted" => "Product deleted.",
        _ => "Something went wrong, please try again.",
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .route("/reset", get(auth::reset_page).post(auth::reset))
        .route(
            "/new-password/{token}",
            get(auth::new_password_page).post(auth::new_password),
        )
        .layer(auth_rate_limiter())
}

/// Create the product routes router.
pub fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(shop::index))
        .route("/products", get(shop::index))
        .route("/products/{id}", get(shop::show))
}

/// Create the cart, checkout and order routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show).post(cart::add))
        .route("/cart/delete-item", post(cart::delete_item))
        .route("/cart/decrement-item", post(cart::decrement_item))
        .route("/checkout", get(checkout::show))
        .route("/checkout/success", get(checkout::success))
        .route("/checkout/cancel", get(checkout::cancel))
        .route("/create-order", post(checkout::create_order))
        .route("/orders", get(orders::index))
        .route("/orders/{id}/invoice", get(orders::invoice))
        .layer(cart_rate_limiter())
}

/// Create the product administration routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(admin::products))
        .route(
            "/add-product",
            get(admin::add_product_page).post(admin::add_product),
        )
        .route("/edit-product/{id}", get(admin::edit_product_page))
        .route("/edit-product", post(admin::edit_product))
        .route("/delete-product", post(admin::delete_product))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(shop_routes())
        .merge(cart_routes())
        .merge(auth_routes())
        .nest("/admin", admin_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_message_code_is_generic() {
        assert_eq!(message_for("registered"), "Account created, you can log in now.");
        assert_eq!(
            message_for("<script>"),
            "Something went wrong, please try again."
        );
    }
}
