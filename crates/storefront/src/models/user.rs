//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Duration, Utc};

use emporium_core::{Cart, Email, Price, UserId};

/// How long a password reset token stays valid, in seconds.
pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;

/// A storefront user with their embedded cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name, copied onto orders.
    pub name: String,
    /// User's email address.
    pub email: Email,
    /// The user's cart. Only `CartService` writes it back to storage.
    pub cart: Cart,
    /// Version of the stored cart this value was loaded at.
    pub cart_version: i32,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// A pending password reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    /// Hex-encoded random token sent by email.
    pub token: String,
    /// Instant after which the token is rejected.
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// A reset for `token` that expires one hour after `now`.
    #[must_use]
    pub fn starting_at(token: String, now: DateTime<Utc>) -> Self {
        Self {
            token,
            expires_at: now + Duration::seconds(RESET_TOKEN_TTL_SECS),
        }
    }

    /// Whether the token can still be used at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Validated input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub title: String,
    pub price: Price,
    pub description: String,
    pub image_path: String,
    pub owner_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_token_expires_after_one_hour() {
        let now = Utc::now();
        let reset = PasswordReset::starting_at("abc".to_string(), now);

        assert!(reset.is_valid_at(now));
        assert!(reset.is_valid_at(now + Duration::minutes(59)));
        assert!(!reset.is_valid_at(now + Duration::hours(1)));
        assert!(!reset.is_valid_at(now + Duration::hours(2)));
    }
}
