//! User repository for database operations.
//!
//! The cart lives in the `cart` JSONB column of `storefront.user`. Every cart
//! write is a compare-and-swap on `cart_version`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use emporium_core::{Cart, Email, ProductId, UserId};

use super::{RepositoryError, UserStore, conflict_on_unique};
use crate::models::{PasswordReset, User};

const USER_COLUMNS: &str = "id, name, email, cart, cart_version, created_at";

/// Row shape shared by every user query.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    cart: Json<Cart>,
    cart_version: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email,
            cart: row.cart.0,
            cart_version: row.cart_version,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for UserRepository<'_> {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<UserWithPasswordRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM storefront.user WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .transpose()
    }

    async fn create_user(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.user (name, email, password_hash, cart)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(name)
        .bind(email.as_str())
        .bind(password_hash)
        .bind(Json(Cart::empty()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        User::try_from(row)
    }

    async fn save_cart(
        &self,
        user_id: UserId,
        cart: &Cart,
        expected_version: i32,
    ) -> Result<i32, RepositoryError> {
        let new_version: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.user
            SET cart = $2, cart_version = cart_version + 1, updated_at = now()
            WHERE id = $1 AND cart_version = $3
            RETURNING cart_version
            ",
        )
        .bind(user_id)
        .bind(Json(cart))
        .bind(expected_version)
        .fetch_optional(self.pool)
        .await?;

        if let Some(version) = new_version {
            return Ok(version);
        }

        // Distinguish a stale version from a missing user
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM storefront.user WHERE id = $1)")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        if exists {
            Err(RepositoryError::Conflict(format!(
                "cart for user {user_id} changed since version {expected_version}"
            )))
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn users_with_product_in_cart(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<User>, RepositoryError> {
        let needle = serde_json::json!([{ "product_id": product_id }]);
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE cart -> 'lines' @> $1"
        ))
        .bind(Json(needle))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn set_password_reset(
        &self,
        user_id: UserId,
        reset: &PasswordReset,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET reset_token = $2, reset_token_expires_at = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .bind(&reset.token)
        .bind(reset.expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            SELECT {USER_COLUMNS} FROM storefront.user
            WHERE reset_token = $1 AND reset_token_expires_at > $2
            "
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn reset_password(
        &self,
        user_id: UserId,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET password_hash = $3,
                reset_token = NULL,
                reset_token_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND reset_token = $2 AND reset_token_expires_at > $4
            ",
        )
        .bind(user_id)
        .bind(token)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
