//! Product repository for database operations.

use sqlx::PgPool;

use emporium_core::{Price, Product, ProductId, UserId};

use super::{CatalogStore, RepositoryError};
use crate::models::NewProduct;

const PRODUCT_COLUMNS: &str = "id, title, price, description, image_path, owner_id";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    title: String,
    price: Price,
    description: String,
    image_path: String,
    owner_id: UserId,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            price: row.price,
            description: row.description,
            image_path: row.image_path,
            owner_id: row.owner_id,
        }
    }
}

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl CatalogStore for ProductRepository<'_> {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn list_products(&self, offset: u64, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn count_products(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.product")
            .fetch_one(self.pool)
            .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative row count {count}")))
    }

    async fn products_by_owner(&self, owner: UserId) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row: ProductRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.product (title, price, description, image_path, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.title)
        .bind(product.price)
        .bind(&product.description)
        .bind(&product.image_path)
        .bind(product.owner_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.product
            SET title = $3, price = $4, description = $5, image_path = $6, updated_at = now()
            WHERE id = $1 AND owner_id = $2
            ",
        )
        .bind(product.id)
        .bind(product.owner_id)
        .bind(&product.title)
        .bind(product.price)
        .bind(&product.description)
        .bind(&product.image_path)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_product(&self, id: ProductId, owner: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.product WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
