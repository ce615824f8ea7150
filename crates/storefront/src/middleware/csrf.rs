//! Per-session CSRF tokens for HTML forms.
//!
//! A random token is minted on first use and kept in the session. Every
//! state-changing form embeds it as `_csrf`; handlers call [`verify_csrf`]
//! before acting on the submission.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::session_keys;

/// Form field carrying the token.
pub const CSRF_FIELD: &str = "_csrf";

/// The session's CSRF token, for embedding in forms.
#[derive(Clone, Debug)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    /// Generate a new random token (256-bit, base64url-encoded).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the token value for use in templates.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "session layer missing"))?;

        token_for(session)
            .await
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "session unavailable"))
    }
}

/// The session's token, creating one if the session has none yet.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn token_for(session: &Session) -> Result<CsrfToken, tower_sessions::session::Error> {
    if let Some(token) = session.get::<String>(session_keys::CSRF_TOKEN).await? {
        return Ok(CsrfToken(token));
    }
    let token = CsrfToken::generate();
    session.insert(session_keys::CSRF_TOKEN, &token.0).await?;
    Ok(token)
}

/// Check a submitted token against the session's.
///
/// # Errors
///
/// Returns `AppError::Forbidden` when the token is missing or differs.
pub async fn verify_csrf(session: &Session, submitted: &str) -> Result<(), AppError> {
    let expected = session.get::<String>(session_keys::CSRF_TOKEN).await?;
    match expected {
        Some(expected) if constant_time_eq(expected.as_bytes(), submitted.as_bytes()) => Ok(()),
        _ => {
            tracing::warn!("CSRF token mismatch");
            Err(AppError::Forbidden("invalid form token".to_string()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_differ() {
        let a = CsrfToken::generate();
        let b = CsrfToken::generate();
        assert_ne!(a.value(), b.value());
        assert_eq!(a.value().len(), 43);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"", b"a"));
    }
}
