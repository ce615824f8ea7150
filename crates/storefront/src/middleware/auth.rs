//! Who is shopping.
//!
//! Login stores a [`CurrentUser`] in the session; these extractors read it
//! back. Cart, checkout, order and admin handlers take [`RequireAuth`], while
//! pages that only change their header for signed-in shoppers take
//! [`OptionalAuth`].

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentUser, session_keys};

/// Where anonymous shoppers are sent.
const LOGIN_PATH: &str = "/login";

/// The signed-in shopper. Anonymous requests are sent to `/login`.
pub struct RequireAuth(pub CurrentUser);

/// The signed-in shopper, if any.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Why [`RequireAuth`] turned a request away.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthRejection {
    /// Nobody is logged in on this session.
    NotLoggedIn,
    /// The route is not behind the session layer.
    NoSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotLoggedIn => Redirect::to(LOGIN_PATH).into_response(),
            Self::NoSession => {
                tracing::error!("Auth extractor used on a route without sessions");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Read the logged-in user off the request's session.
///
/// An unreadable session entry counts as logged out.
async fn session_user(parts: &Parts) -> Result<Option<CurrentUser>, AuthRejection> {
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or(AuthRejection::NoSession)?;
    Ok(session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten())
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_user(parts)
            .await?
            .map(Self)
            .ok_or(AuthRejection::NotLoggedIn)
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_user(parts).await.ok().flatten()))
    }
}

/// Log `user` in. The session ID is cycled first to rule out fixation.
///
/// # Errors
///
/// Returns an error if the session store rejects the change.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Log out. Flushes the session, CSRF token included.
///
/// # Errors
///
/// Returns an error if the session store rejects the change.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, header};

    #[test]
    fn test_anonymous_shopper_sent_to_login() {
        let response = AuthRejection::NotLoggedIn.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            LOGIN_PATH
        );
    }

    #[tokio::test]
    async fn test_missing_session_layer_is_reported() {
        let (parts, ()) = Request::new(()).into_parts();
        assert_eq!(session_user(&parts).await, Err(AuthRejection::NoSession));
        assert_eq!(
            AuthRejection::NoSession.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
