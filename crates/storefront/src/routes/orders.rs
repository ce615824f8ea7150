//! Order history and invoice handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use tracing::instrument;

use emporium_core::{Order, OrderId};

use super::PageContext;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::services::invoice::{invoice_file_name, render_invoice, save_invoice};
use crate::services::OrderService;
use crate::state::AppState;

/// One item of a past order, as snapshotted.
#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub title: String,
    pub price: String,
    pub quantity: u32,
}

/// A past order for the history page.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: OrderId,
    pub placed_at: String,
    pub items: Vec<OrderItemView>,
    pub total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            placed_at: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemView {
                    title: item.product.title.clone(),
                    price: item.product.price.to_string(),
                    quantity: item.quantity.get(),
                })
                .collect(),
            total: format!("{:.2}", order.total_price),
        }
    }
}

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersTemplate {
    pub page: PageContext,
    pub orders: Vec<OrderView>,
}

/// Display the user's orders, newest first.
#[instrument(skip(state, page, current), fields(user_id = %current.id))]
pub async fn index(
    State(state): State<AppState>,
    page: PageContext,
    RequireAuth(current): RequireAuth,
) -> Result<impl IntoResponse> {
    let (products, orders) = (state.products(), state.orders());
    let orders = OrderService::new(&products, &orders)
        .list_orders(current.id)
        .await?;

    Ok(OrdersTemplate {
        page,
        orders: orders.iter().map(OrderView::from).collect(),
    })
}

/// Stream the PDF invoice for one of the user's orders.
///
/// The rendered file is also kept under the invoice directory.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn invoice(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let (products, orders) = (state.products(), state.orders());
    let order = OrderService::new(&products, &orders)
        .invoice_order(OrderId::new(id), current.id)
        .await?;

    let pdf = render_invoice(&order);
    save_invoice(&state.config().catalog.invoice_dir, order.id, &pdf).await?;

    let disposition = format!("inline; filename=\"{}\"", invoice_file_name(order.id));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
