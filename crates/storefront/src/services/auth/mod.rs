//! Authentication service.
//!
//! Password signup and login, plus password reset through an emailed token.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use tracing::instrument;

use emporium_core::{Email, UserId};

use crate::db::{RepositoryError, UserStore};
use crate::models::{PasswordReset, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 5;

/// Random bytes in a reset token (hex-encoded to twice this length).
const RESET_TOKEN_BYTES: usize = 32;

/// Authentication service.
///
/// Handles user registration, login, and password resets.
pub struct AuthService<'a, U> {
    users: &'a U,
}

impl<'a, U: UserStore> AuthService<'a, U> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a U) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with name, email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingName`, `InvalidEmail`, `WeakPassword` or
    /// `PasswordMismatch` for invalid input, and
    /// `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password, confirm_password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingName);
        }
        let email = Email::parse(email)?;
        validate_password(password)?;
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_user(name, &email, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Start a password reset for the account registered under `email`.
    ///
    /// Stores a fresh token valid for one hour and returns it with the user
    /// so the caller can email the link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no account uses the email.
    #[instrument(skip(self))]
    pub async fn request_password_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, PasswordReset), AuthError> {
        let email = Email::parse(email)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let reset = PasswordReset::starting_at(generate_reset_token(), now);
        self.users.set_password_reset(user.id, &reset).await?;

        Ok((user, reset))
    }

    /// The user a still-valid reset token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` for unknown or expired tokens.
    pub async fn user_for_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        self.users
            .find_by_reset_token(token, now)
            .await?
            .ok_or(AuthError::InvalidResetToken)
    }

    /// Set a new password using a reset token, then invalidate the token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` for an invalid password and
    /// `AuthError::InvalidResetToken` if the token no longer matches the user.
    #[instrument(skip(self, token, password))]
    pub async fn complete_password_reset(
        &self,
        user_id: UserId,
        token: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.users
            .reset_password(user_id, token, &password_hash, now)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::InvalidResetToken,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }
}

/// Validate password meets requirements: at least five ASCII letters or digits.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the failed rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AuthError::WeakPassword(
            "password may only contain letters and numbers".to_string(),
        ));
    }

    Ok(())
}

/// Generate a random, hex-encoded password reset token.
#[must_use]
pub fn generate_reset_token() -> String {
    let bytes: [u8; RESET_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_rules() {
        assert!(validate_password("abc12").is_ok());
        assert!(matches!(
            validate_password("ab1"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("abc 12"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("abc!12"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(matches!(
            verify_password("hunter3", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_reset_token_is_64_hex_chars_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
