//! Catalog route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{Product, ProductId};

use super::PageContext;
use crate::db::CatalogStore;
use crate::error::{AppError, Result};
use crate::filters;
use crate::models::Pagination;
use crate::state::AppState;

/// Product display data for templates.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: ProductId,
    pub title: String,
    pub price: String,
    pub description: String,
    pub image_url: String,
    pub owner_id: emporium_core::UserId,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            price: product.price.to_string(),
            description: product.description.clone(),
            image_url: image_url(&product.image_path),
            owner_id: product.owner_id,
        }
    }
}

/// Public URL of an uploaded product image.
#[must_use]
pub fn image_url(image_path: &str) -> String {
    format!("/images/{image_path}")
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "shop/index.html")]
pub struct ShopIndexTemplate {
    pub page: PageContext,
    pub products: Vec<ProductView>,
    pub pagination: Pagination,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "shop/show.html")]
pub struct ShopShowTemplate {
    pub page: PageContext,
    pub product: ProductView,
}

/// Display a page of the catalog.
#[instrument(skip(state, page))]
pub async fn index(
    State(state): State<AppState>,
    page: PageContext,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse> {
    let catalog = state.products();
    let total = catalog.count_products().await?;
    let pagination = Pagination::new(query.page, state.config().catalog.items_per_page, total);

    let products = catalog
        .list_products(pagination.offset(), pagination.per_page)
        .await?;

    Ok(ShopIndexTemplate {
        page,
        products: products.iter().map(ProductView::from).collect(),
        pagination,
    })
}

/// Display a single product.
#[instrument(skip(state, page))]
pub async fn show(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let product = state
        .products()
        .get_product(ProductId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    Ok(ShopShowTemplate {
        page,
        product: ProductView::from(&product),
    })
}
