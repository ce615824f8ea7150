//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. The session
//! cookie is signed with `STOREFRONT_SESSION_SECRET` used directly as the
//! signing key.

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use thiserror::Error;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "emporium_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Bytes a cookie signing key needs.
pub const SIGNING_KEY_LENGTH: usize = 64;

/// The session secret cannot be used as a signing key.
#[derive(Debug, Error)]
#[error("session secret must be at least 64 bytes to sign cookies")]
pub struct SigningKeyError;

/// Build the cookie signing key from the session secret.
///
/// # Errors
///
/// Returns `SigningKeyError` if the secret is shorter than
/// [`SIGNING_KEY_LENGTH`] bytes.
pub fn signing_key(secret: &SecretString) -> Result<Key, SigningKeyError> {
    Key::try_from(secret.expose_secret().as_bytes()).map_err(|_| SigningKeyError)
}

/// Create the session layer with `PostgreSQL` store.
///
/// The `tower_sessions.session` table is created by `emp-cli migrate`.
///
/// # Errors
///
/// Returns `SigningKeyError` if the session secret is too short to sign
/// with. Configuration loading already rejects such secrets.
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> Result<SessionManagerLayer<PostgresStore, tower_sessions::service::SignedCookie>, SigningKeyError>
{
    let store = PostgresStore::new(pool.clone());
    let key = signing_key(&config.session_secret)?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_needs_full_length_secret() {
        let short = SecretString::from("k".repeat(SIGNING_KEY_LENGTH - 1));
        assert!(signing_key(&short).is_err());

        let exact = SecretString::from("k".repeat(SIGNING_KEY_LENGTH));
        assert!(signing_key(&exact).is_ok());
    }
}
