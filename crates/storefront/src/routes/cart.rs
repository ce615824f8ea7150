//! Cart route handlers.
//!
//! The cart lives on the user row. Every handler reloads the user so the
//! optimistic version check runs against what is actually stored.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use emporium_core::{Cart, CartLine, Product, ProductId};

use super::shop::image_url;
use super::{PageContext, load_user};
use crate::db::CatalogStore;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{RequireAuth, verify_csrf};
use crate::services::CartService;
use crate::state::AppState;

/// Cart line display data for templates.
#[derive(Debug, Clone)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub title: String,
    pub image_url: Option<String>,
    pub price: String,
    pub quantity: u32,
    pub line_total: String,
    /// False when the product has left the catalog.
    pub available: bool,
}

/// Form posted by the cart buttons.
#[derive(Debug, Deserialize)]
pub struct CartItemForm {
    pub product_id: i32,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub page: PageContext,
    pub lines: Vec<CartLineView>,
    pub has_unavailable: bool,
    pub total: String,
    pub item_count: u32,
}

/// Resolve each cart line against the catalog, keeping cart order.
///
/// # Errors
///
/// Returns `AppError::Database` if a lookup fails.
pub async fn cart_lines<C: CatalogStore>(
    catalog: &C,
    cart: &Cart,
) -> Result<Vec<(CartLine, Option<Product>)>> {
    let mut lines = Vec::with_capacity(cart.lines().len());
    for line in cart.lines() {
        let product = catalog.get_product(line.product_id()).await?;
        lines.push((*line, product));
    }
    Ok(lines)
}

fn line_view(line: &CartLine, product: Option<&Product>) -> CartLineView {
    let (title, image_url, available) = match product {
        Some(p) => (p.title.clone(), Some(image_url(&p.image_path)), true),
        None => ("No longer available".to_string(), None, false),
    };
    CartLineView {
        product_id: line.product_id(),
        title,
        image_url,
        price: line.unit_price().to_string(),
        quantity: line.quantity(),
        line_total: format!("{:.2}", line.line_total()),
        available,
    }
}

/// Display the cart.
#[instrument(skip(state, page, current), fields(user_id = %current.id))]
pub async fn show(
    State(state): State<AppState>,
    page: PageContext,
    RequireAuth(current): RequireAuth,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &current).await?;
    let lines = cart_lines(&state.products(), &user.cart)
        .await?
        .iter()
        .map(|(line, product)| line_view(line, product.as_ref()))
        .collect::<Vec<_>>();
    let has_unavailable = lines.iter().any(|l| !l.available);

    Ok(CartTemplate {
        page,
        lines,
        has_unavailable,
        total: format!("{:.2}", user.cart.total_price()),
        item_count: user.cart.item_count(),
    })
}

async fn find_product(state: &AppState, id: i32) -> Result<Product> {
    state
        .products()
        .get_product(ProductId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}

/// Add one unit of a product.
#[instrument(skip(state, session, current, form), fields(user_id = %current.id, product_id = form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<CartItemForm>,
) -> Result<impl IntoResponse> {
    verify_csrf(&session, &form.csrf).await?;
    let product = find_product(&state, form.product_id).await?;
    let mut user = load_user(&state, &current).await?;

    let users = state.users();
    CartService::new(&users).add_to_cart(&mut user, &product).await?;

    let product_id = product.id.to_string();
    add_breadcrumb("cart", "Added product", Some(&[("product_id", &product_id)]));
    Ok(Redirect::to("/cart"))
}

/// Remove a product's whole line from the cart.
///
/// Needs no catalog lookup, so lines for deleted products can be cleared.
#[instrument(skip(state, session, current, form), fields(user_id = %current.id, product_id = form.product_id))]
pub async fn delete_item(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<CartItemForm>,
) -> Result<impl IntoResponse> {
    verify_csrf(&session, &form.csrf).await?;
    let mut user = load_user(&state, &current).await?;

    let users = state.users();
    CartService::new(&users)
        .remove_from_cart(&mut user, ProductId::new(form.product_id))
        .await?;

    Ok(Redirect::to("/cart"))
}

/// Remove a single unit of a product from the cart.
#[instrument(skip(state, session, current, form), fields(user_id = %current.id, product_id = form.product_id))]
pub async fn decrement_item(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<CartItemForm>,
) -> Result<impl IntoResponse> {
    verify_csrf(&session, &form.csrf).await?;
    let mut user = load_user(&state, &current).await?;

    let users = state.users();
    CartService::new(&users)
        .decrement_in_cart(&mut user, ProductId::new(form.product_id))
        .await?;

    Ok(Redirect::to("/cart"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emporium_core::Price;

    #[test]
    fn test_line_view_for_deleted_product_keeps_stored_price() {
        let mut cart = Cart::empty();
        let id = ProductId::new(4);
        cart.add_product(id, Price::parse("2.50").unwrap()).unwrap();
        cart.add_product(id, Price::parse("2.50").unwrap()).unwrap();

        let view = line_view(cart.line(id).unwrap(), None);
        assert!(!view.available);
        assert_eq!(view.price, "2.50");
        assert_eq!(view.line_total, "5.00");
        assert_eq!(view.quantity, 2);

        let template = CartTemplate {
            page: PageContext {
                user: None,
                csrf_token: "token".to_string(),
            },
            lines: vec![view],
            has_unavailable: true,
            total: "5.00".to_string(),
            item_count: 2,
        };
        let html = template.render().unwrap();
        assert!(html.contains("/cart/delete-item"));
        assert!(!html.contains("/cart/decrement-item"));
    }
}
