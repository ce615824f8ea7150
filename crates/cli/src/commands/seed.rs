//! Seed the catalog with products from a YAML file.
//!
//! # File Format
//!
//! ```yaml
//! products:
//!   - title: Reading Lamp
//!     price: "24.99"
//!     description: A warm lamp for long evenings.
//!     image: lamp.jpg
//! ```
//!
//! `image` names a file already present in `STOREFRONT_UPLOAD_DIR`.
//! Every entry is validated before anything is written.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use emporium_core::{Email, Price};
use emporium_storefront::db::{CatalogStore, ProductRepository, UserRepository, UserStore};
use emporium_storefront::models::NewProduct;

use super::migrate::database_url;

/// Top-level structure of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub products: Vec<SeedProduct>,
}

/// One product entry in a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub title: String,
    pub price: String,
    pub description: String,
    pub image: String,
}

/// A seed entry that passed validation.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidSeedProduct {
    pub title: String,
    pub price: Price,
    pub description: String,
    pub image: String,
}

/// Validate every entry, returning all problems at once.
///
/// # Errors
///
/// Returns one message per invalid field, prefixed with the entry index.
pub fn validate(file: &SeedFile) -> Result<Vec<ValidSeedProduct>, Vec<String>> {
    let mut valid = Vec::with_capacity(file.products.len());
    let mut errors = Vec::new();

    for (i, product) in file.products.iter().enumerate() {
        let title = product.title.trim();
        if title.chars().count() < 3 {
            errors.push(format!("products[{i}]: title must be at least 3 characters"));
        }
        let description = product.description.trim();
        if !(5..=200).contains(&description.chars().count()) {
            errors.push(format!("products[{i}]: description must be 5 to 200 characters"));
        }
        let image = product.image.trim();
        if image.is_empty() || image.contains(['/', '\\']) {
            errors.push(format!("products[{i}]: image must be a plain file name"));
        }
        match Price::parse(&product.price) {
            Ok(price) => valid.push(ValidSeedProduct {
                title: title.to_string(),
                price,
                description: description.to_string(),
                image: image.to_string(),
            }),
            Err(e) => errors.push(format!("products[{i}]: {e}")),
        }
    }

    if errors.is_empty() { Ok(valid) } else { Err(errors) }
}

/// Insert the products in `file_path`, owned by the user with `owner_email`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, the owner does
/// not exist, or an insert fails.
pub async fn products(file_path: &Path, owner_email: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !file_path.exists() {
        return Err(format!("File not found: {}", file_path.display()).into());
    }

    info!(path = %file_path.display(), "Loading products from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(file_path).await?;
    let file: SeedFile = serde_yaml::from_str(&content)?;
    let owner_email = Email::parse(owner_email)?;

    let products = validate(&file).map_err(|errors| {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        format!("{} validation errors found", errors.len())
    })?;

    let pool = emporium_storefront::db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let owner = UserRepository::new(&pool)
        .get_by_email(&owner_email)
        .await?
        .ok_or_else(|| format!("No user with email {owner_email}"))?;

    let catalog = ProductRepository::new(&pool);
    for product in products {
        let created = catalog
            .create_product(&NewProduct {
                title: product.title,
                price: product.price,
                description: product.description,
                image_path: product.image,
                owner_id: owner.id,
            })
            .await?;
        info!(product_id = %created.id, title = %created.title, "Product inserted");
    }

    info!("Seeding complete!");
    Ok(())
}
