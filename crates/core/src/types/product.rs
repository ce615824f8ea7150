//! Catalog product.

use serde::{Deserialize, Serialize};

use super::id::{ProductId, UserId};
use super::price::Price;

/// A product in the catalog.
///
/// Products are owned by the user who listed them; only the owner may edit or
/// delete one. Orders never reference a product directly, they carry a
/// [`ProductSnapshot`](super::order::ProductSnapshot) instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog ID.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Current unit price.
    pub price: Price,
    /// Free-text description.
    pub description: String,
    /// Path of the uploaded image, relative to the image root.
    pub image_path: String,
    /// User who listed the product.
    pub owner_id: UserId,
}

impl Product {
    /// Whether `user_id` listed this product.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}
