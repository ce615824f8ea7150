//! Product administration handlers.
//!
//! Users manage the products they listed. Forms are multipart so an image
//! can be uploaded alongside the fields; invalid input re-renders the form
//! with status 422 and the values entered.

use std::path::Path as FsPath;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use emporium_core::{Price, Product, ProductId, UserId};

use super::PageContext;
use super::shop::ProductView;
use crate::db::{CatalogStore, UserStore};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{RequireAuth, verify_csrf};
use crate::models::NewProduct;
use crate::services::CartService;
use crate::services::uploads::{ImageUpload, delete_image, store_image};
use crate::state::AppState;

const MIN_TITLE_CHARS: usize = 3;
const MIN_DESCRIPTION_CHARS: usize = 5;
const MAX_DESCRIPTION_CHARS: usize = 200;

// =============================================================================
// Forms
// =============================================================================

/// Raw product form fields as submitted.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub product_id: Option<i32>,
    pub title: String,
    pub price: String,
    pub description: String,
    pub image: Option<ImageUpload>,
    pub csrf: String,
}

/// Product fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidProduct {
    pub title: String,
    pub price: Price,
    pub description: String,
}

impl ProductForm {
    /// Read the form out of a multipart body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the body is not valid multipart.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !bytes.is_empty() {
                    form.image = Some(ImageUpload {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            match name.as_str() {
                "product_id" => form.product_id = value.trim().parse().ok(),
                "title" => form.title = value,
                "price" => form.price = value,
                "description" => form.description = value,
                "_csrf" => form.csrf = value,
                _ => {}
            }
        }
        Ok(form)
    }

    /// Check the fields, collecting every problem.
    ///
    /// `image_required` is true when creating a product.
    ///
    /// # Errors
    ///
    /// Returns the list of messages to show next to the form.
    pub fn validate(&self, image_required: bool) -> std::result::Result<ValidProduct, Vec<String>> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        if title.chars().count() < MIN_TITLE_CHARS {
            errors.push(format!("Title must be at least {MIN_TITLE_CHARS} characters."));
        }

        let price = Price::parse(&self.price).map_err(|e| errors.push(format!("Price: {e}.")));

        let description = self.description.trim();
        let description_len = description.chars().count();
        if !(MIN_DESCRIPTION_CHARS..=MAX_DESCRIPTION_CHARS).contains(&description_len) {
            errors.push(format!(
                "Description must be {MIN_DESCRIPTION_CHARS} to {MAX_DESCRIPTION_CHARS} characters."
            ));
        }

        match &self.image {
            Some(image) => {
                if let Err(e) = image.extension() {
                    errors.push(format!("Image: {e}."));
                }
            }
            None if image_required => errors.push("Attached file is not an image.".to_string()),
            None => {}
        }

        match price {
            Ok(price) if errors.is_empty() => Ok(ValidProduct {
                title: title.to_string(),
                price,
                description: description.to_string(),
            }),
            _ => Err(errors),
        }
    }
}

/// Form posted by the delete button.
#[derive(Debug, Deserialize)]
pub struct DeleteProductForm {
    pub product_id: i32,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

// =============================================================================
// Templates
// =============================================================================

/// The user's products.
#[derive(Template, WebTemplate)]
#[template(path = "admin/products.html")]
pub struct AdminProductsTemplate {
    pub page: PageContext,
    pub products: Vec<ProductView>,
}

/// Add/edit product form.
#[derive(Template, WebTemplate)]
#[template(path = "admin/product_form.html")]
pub struct ProductFormTemplate {
    pub page: PageContext,
    pub editing: bool,
    pub product_id: Option<ProductId>,
    pub title: String,
    pub price: String,
    pub description: String,
    pub errors: Vec<String>,
}

impl ProductFormTemplate {
    fn blank(page: PageContext) -> Self {
        Self {
            page,
            editing: false,
            product_id: None,
            title: String::new(),
            price: String::new(),
            description: String::new(),
            errors: Vec::new(),
        }
    }

    fn for_product(page: PageContext, product: &Product) -> Self {
        Self {
            page,
            editing: true,
            product_id: Some(product.id),
            title: product.title.clone(),
            price: product.price.to_string(),
            description: product.description.clone(),
            errors: Vec::new(),
        }
    }

    fn rejected(page: PageContext, form: ProductForm, editing: bool, errors: Vec<String>) -> Response {
        let template = Self {
            page,
            editing,
            product_id: form.product_id.map(ProductId::new),
            title: form.title,
            price: form.price,
            description: form.description,
            errors,
        };
        (StatusCode::UNPROCESSABLE_ENTITY, template).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Load a product the current user owns.
///
/// Products owned by someone else are reported as `Forbidden`.
async fn owned_product(state: &AppState, id: ProductId, owner: UserId) -> Result<Product> {
    let product = state
        .products()
        .get_product(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    if !product.is_owned_by(owner) {
        tracing::warn!(product_id = %id, user_id = %owner, "Product owned by another user");
        return Err(AppError::Forbidden("not your product".to_string()));
    }
    Ok(product)
}

/// List the current user's products.
#[instrument(skip(state, page, current), fields(user_id = %current.id))]
pub async fn products(
    State(state): State<AppState>,
    page: PageContext,
    RequireAuth(current): RequireAuth,
) -> Result<impl IntoResponse> {
    let products = state.products().products_by_owner(current.id).await?;
    Ok(AdminProductsTemplate {
        page,
        products: products.iter().map(ProductView::from).collect(),
    })
}

/// Display an empty product form.
pub async fn add_product_page(page: PageContext, RequireAuth(_current): RequireAuth) -> impl IntoResponse {
    ProductFormTemplate::blank(page)
}

/// Create a product from the submitted form.
#[instrument(skip(state, session, page, current, multipart), fields(user_id = %current.id))]
pub async fn add_product(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    RequireAuth(current): RequireAuth,
    multipart: Multipart,
) -> Result<Response> {
    let form = ProductForm::from_multipart(multipart).await?;
    verify_csrf(&session, &form.csrf).await?;

    let valid = match form.validate(true) {
        Ok(valid) => valid,
        Err(errors) => return Ok(ProductFormTemplate::rejected(page, form, false, errors)),
    };
    let Some(image) = &form.image else {
        return Err(AppError::BadRequest("image missing".to_string()));
    };

    let upload_dir = &state.config().catalog.upload_dir;
    let image_path = store_image(upload_dir, image).await?;
    let new_product = NewProduct {
        title: valid.title,
        price: valid.price,
        description: valid.description,
        image_path: image_path.clone(),
        owner_id: current.id,
    };

    match state.products().create_product(&new_product).await {
        Ok(product) => {
            tracing::info!(product_id = %product.id, "Product created");
            Ok(Redirect::to("/admin/products").into_response())
        }
        Err(e) => {
            if let Err(cleanup) = delete_image(upload_dir, &image_path).await {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned image");
            }
            Err(e.into())
        }
    }
}

/// Display the edit form for one of the user's products.
pub async fn edit_product_page(
    State(state): State<AppState>,
    page: PageContext,
    RequireAuth(current): RequireAuth,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let product = owned_product(&state, ProductId::new(id), current.id).await?;
    Ok(ProductFormTemplate::for_product(page, &product))
}

/// Save changes to a product. A new image replaces and deletes the old one.
///
/// Orders keep their own snapshot, so past orders are unaffected.
#[instrument(skip(state, session, page, current, multipart), fields(user_id = %current.id))]
pub async fn edit_product(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    RequireAuth(current): RequireAuth,
    multipart: Multipart,
) -> Result<Response> {
    let form = ProductForm::from_multipart(multipart).await?;
    verify_csrf(&session, &form.csrf).await?;

    let id = form
        .product_id
        .map(ProductId::new)
        .ok_or_else(|| AppError::BadRequest("product_id missing".to_string()))?;
    let mut product = owned_product(&state, id, current.id).await?;

    let valid = match form.validate(false) {
        Ok(valid) => valid,
        Err(errors) => return Ok(ProductFormTemplate::rejected(page, form, true, errors)),
    };

    let upload_dir = &state.config().catalog.upload_dir;
    let replaced_image = match &form.image {
        Some(image) => {
            let stored = store_image(upload_dir, image).await?;
            Some(std::mem::replace(&mut product.image_path, stored))
        }
        None => None,
    };
    product.title = valid.title;
    product.price = valid.price;
    product.description = valid.description;

    state.products().update_product(&product).await?;

    if let Some(old) = replaced_image {
        delete_image(upload_dir, &old).await?;
    }

    tracing::info!(product_id = %product.id, "Product updated");
    Ok(Redirect::to("/admin/products").into_response())
}

/// Delete one of the user's products.
#[instrument(skip(state, session, current, form), fields(user_id = %current.id, product_id = form.product_id))]
pub async fn delete_product(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<DeleteProductForm>,
) -> Result<Redirect> {
    verify_csrf(&session, &form.csrf).await?;
    let product = owned_product(&state, ProductId::new(form.product_id), current.id).await?;

    let (products, users) = (state.products(), state.users());
    remove_from_catalog(
        &products,
        &users,
        &state.config().catalog.upload_dir,
        &product,
    )
    .await?;

    Ok(Redirect::to("/admin/products"))
}

/// Take `product` out of the catalog, out of every cart, and off disk.
///
/// The row goes first, so a failed delete leaves the product fully intact.
/// Carts that still end up holding the product can remove the line
/// themselves, and a leftover image file only costs disk space, so neither
/// later step fails the deletion. Returns how many carts were updated.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the row is gone or owned by someone else,
/// or `AppError::Database` if the delete fails.
pub async fn remove_from_catalog<C: CatalogStore, U: UserStore>(
    catalog: &C,
    users: &U,
    upload_dir: &FsPath,
    product: &Product,
) -> Result<usize> {
    if !catalog.delete_product(product.id, product.owner_id).await? {
        return Err(AppError::NotFound(format!("product {}", product.id)));
    }

    let purged = match CartService::new(users).purge_product(product.id).await {
        Ok(purged) => purged,
        Err(e) => {
            tracing::warn!(product_id = %product.id, error = %e, "Could not purge deleted product from carts");
            0
        }
    };

    if let Err(e) = delete_image(upload_dir, &product.image_path).await {
        tracing::warn!(product_id = %product.id, error = %e, "Could not delete product image");
    }

    tracing::info!(product_id = %product.id, carts = purged, "Product deleted");
    Ok(purged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form(title: &str, price: &str, description: &str) -> ProductForm {
        ProductForm {
            title: title.to_string(),
            price: price.to_string(),
            description: description.to_string(),
            image: Some(ImageUpload {
                content_type: "image/png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
            }),
            ..ProductForm::default()
        }
    }

    #[test]
    fn test_valid_form_is_trimmed() {
        let valid = form("  Lamp ", "19.99", "  A warm lamp  ")
            .validate(true)
            .unwrap();
        assert_eq!(valid.title, "Lamp");
        assert_eq!(valid.price, Price::parse("19.99").unwrap());
        assert_eq!(valid.description, "A warm lamp");
    }

    #[test]
    fn test_collects_every_problem() {
        let errors = form("ab", "0", "tiny").validate(true).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_image_required_on_create_only() {
        let mut f = form("Lamp", "5", "A warm lamp");
        f.image = None;
        assert!(f.validate(true).is_err());
        assert!(f.validate(false).is_ok());
    }

    #[test]
    fn test_rejects_non_image_upload() {
        let mut f = form("Lamp", "5", "A warm lamp");
        f.image = Some(ImageUpload {
            content_type: "application/pdf".to_string(),
            bytes: vec![1, 2, 3],
        });
        assert!(f.validate(true).is_err());
    }

    #[test]
    fn test_description_length_bounds() {
        let long = "x".repeat(MAX_DESCRIPTION_CHARS + 1);
        assert!(form("Lamp", "5", &long).validate(true).is_err());
        let max = "x".repeat(MAX_DESCRIPTION_CHARS);
        assert!(form("Lamp", "5", &max).validate(true).is_ok());
    }
}
