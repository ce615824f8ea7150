//! Checkout route handlers.
//!
//! `GET /checkout` opens a Stripe Checkout Session for the cart and links to
//! the hosted payment page. Stripe sends the customer back to
//! `/checkout/success`, where the session is checked before the order is
//! placed.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::cart::{CartLineView, cart_lines};
use super::shop::image_url;
use super::{PageContext, load_user};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{RequireAuth, verify_csrf};
use crate::services::payments::PaymentLineItem;
use crate::services::{OrderError, OrderService};
use crate::state::AppState;

/// Checkout summary page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub lines: Vec<CartLineView>,
    pub total: String,
    pub checkout_url: String,
    pub error: Option<String>,
}

/// Query parameters Stripe appends on success.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
}

/// Query parameters for error display.
#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    pub error: Option<String>,
}

/// Form for placing an order without Stripe.
#[derive(Debug, Deserialize)]
pub struct CreateOrderForm {
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// Show the checkout summary with a link to the hosted payment page.
#[instrument(skip(state, page, current, query), fields(user_id = %current.id))]
pub async fn show(
    State(state): State<AppState>,
    page: PageContext,
    RequireAuth(current): RequireAuth,
    Query(query): Query<CheckoutQuery>,
) -> Result<Response> {
    let user = load_user(&state, &current).await?;
    if user.cart.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let resolved = cart_lines(&state.products(), &user.cart).await?;
    let mut lines = Vec::with_capacity(resolved.len());
    let mut items = Vec::with_capacity(resolved.len());
    for (line, product) in resolved {
        // Lines for deleted products have to be cleared from the cart first
        let Some(product) = product else {
            return Ok(Redirect::to("/cart").into_response());
        };
        items.push(PaymentLineItem {
            name: product.title.clone(),
            description: product.description.clone(),
            unit_price: line.unit_price(),
            quantity: line.quantity(),
        });
        lines.push(CartLineView {
            product_id: product.id,
            title: product.title,
            image_url: Some(image_url(&product.image_path)),
            price: line.unit_price().to_string(),
            quantity: line.quantity(),
            line_total: format!("{:.2}", line.line_total()),
            available: true,
        });
    }

    let config = state.config();
    let session = state
        .payments()
        .create_checkout_session(
            user.id,
            user.email.as_str(),
            &items,
            &config.url_for("/checkout/success?session_id={CHECKOUT_SESSION_ID}"),
            &config.url_for("/checkout/cancel"),
        )
        .await?;
    let checkout_url = session.redirect_url()?.to_string();

    Ok(CheckoutTemplate {
        page,
        lines,
        total: format!("{:.2}", user.cart.total_price()),
        checkout_url,
        error: query.error.as_deref().map(|c| super::message_for(c).to_string()),
    }
    .into_response())
}

/// Place the order once Stripe confirms payment.
///
/// Each session pays for one order. A refresh after the order was placed
/// goes straight to the order history, and a session whose amount no longer
/// matches the cart sends the customer back to checkout.
#[instrument(skip(state, current, query), fields(user_id = %current.id))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Query(query): Query<SuccessQuery>,
) -> Result<Redirect> {
    let session = state.payments().retrieve_session(&query.session_id).await?;
    if !session.belongs_to(current.id) {
        return Err(AppError::Forbidden(
            "checkout session belongs to another user".to_string(),
        ));
    }
    if !session.is_paid() {
        tracing::info!(session_id = %session.id, status = %session.payment_status, "Checkout not paid");
        return Ok(Redirect::to("/checkout?error=unpaid"));
    }

    let mut user = load_user(&state, &current).await?;
    let (products, orders) = (state.products(), state.orders());
    let order_id = match OrderService::new(&products, &orders)
        .place_paid_order(&mut user, &session)
        .await
    {
        Ok(order_id) => order_id,
        Err(OrderError::SessionUsed(_) | OrderError::EmptyCart) => {
            return Ok(Redirect::to("/orders"));
        }
        Err(OrderError::PaymentMismatch(_)) => {
            return Ok(Redirect::to("/checkout?error=cart_changed"));
        }
        Err(e) => return Err(e.into()),
    };

    let order_id = order_id.to_string();
    add_breadcrumb(
        "checkout",
        "Paid order placed",
        Some(&[("order_id", &order_id), ("session_id", &session.id)]),
    );
    Ok(Redirect::to("/orders"))
}

/// Customer left the hosted page without paying.
pub async fn cancel(RequireAuth(_current): RequireAuth) -> Redirect {
    Redirect::to("/checkout")
}

/// Place the order directly from the cart.
#[instrument(skip(state, session, current, form), fields(user_id = %current.id))]
pub async fn create_order(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<CreateOrderForm>,
) -> Result<Redirect> {
    verify_csrf(&session, &form.csrf).await?;
    let mut user = load_user(&state, &current).await?;

    let (products, orders) = (state.products(), state.orders());
    OrderService::new(&products, &orders)
        .place_order(&mut user)
        .await?;

    Ok(Redirect::to("/orders"))
}
