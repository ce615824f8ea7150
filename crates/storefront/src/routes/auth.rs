//! Authentication route handlers.
//!
//! Handles login, signup, logout and password resets. Form validation
//! failures re-render the form with status 422 and the values entered.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use emporium_core::UserId;

use super::{PageContext, message_for};
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{clear_current_user, set_current_user, verify_csrf};
use crate::models::CurrentUser;
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// Signup form data.
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// Password reset request form data.
#[derive(Debug, Deserialize)]
pub struct ResetForm {
    pub email: String,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// New password form data.
#[derive(Debug, Deserialize)]
pub struct NewPasswordForm {
    pub user_id: i32,
    pub password: String,
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

/// Logout form data.
#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(rename = "_csrf")]
    pub csrf: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub error: Option<String>,
    pub success: Option<String>,
    pub email: String,
}

/// Signup page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub page: PageContext,
    pub error: Option<String>,
    pub name: String,
    pub email: String,
}

/// Password reset request page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/reset.html")]
pub struct ResetTemplate {
    pub page: PageContext,
    pub error: Option<String>,
    pub email: String,
}

/// New password page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/new_password.html")]
pub struct NewPasswordTemplate {
    pub page: PageContext,
    pub error: Option<String>,
    pub user_id: UserId,
    pub token: String,
}

/// Render `template` with 422 Unprocessable Entity.
fn unprocessable(template: impl IntoResponse) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, template).into_response()
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(page: PageContext, Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        page,
        error: query.error.as_deref().map(|c| message_for(c).to_string()),
        success: query.success.as_deref().map(|c| message_for(c).to_string()),
        email: String::new(),
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, page, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    verify_csrf(&session, &form.csrf).await?;

    let users = state.users();
    let user = match AuthService::new(&users).login(&form.email, &form.password).await {
        Ok(user) => user,
        Err(e) if e.is_user_error() => {
            tracing::info!("Login rejected");
            return Ok(unprocessable(LoginTemplate {
                page,
                error: Some("Invalid email or password.".to_string()),
                success: None,
                email: form.email,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current).await?;
    set_sentry_user(&current.id, Some(current.email.as_str()));
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Redirect::to("/").into_response())
}

/// Handle logout.
pub async fn logout(session: Session, Form(form): Form<LogoutForm>) -> Result<Redirect> {
    verify_csrf(&session, &form.csrf).await?;
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/"))
}

// =============================================================================
// Signup Routes
// =============================================================================

/// Display the signup page.
pub async fn signup_page(page: PageContext) -> impl IntoResponse {
    SignupTemplate {
        page,
        error: None,
        name: String::new(),
        email: String::new(),
    }
}

/// Handle signup form submission.
///
/// The welcome email is best effort: a delivery failure is logged and the
/// signup still succeeds.
#[instrument(skip(state, session, page, form), fields(email = %form.email))]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    verify_csrf(&session, &form.csrf).await?;

    let users = state.users();
    let result = AuthService::new(&users)
        .register(&form.name, &form.email, &form.password, &form.confirm_password)
        .await;

    let user = match result {
        Ok(user) => user,
        Err(e) if e.is_user_error() => {
            return Ok(unprocessable(SignupTemplate {
                page,
                error: Some(signup_error_text(&e)),
                name: form.name,
                email: form.email,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(email) = state.email() {
        let shop_url = state.config().url_for("/");
        if let Err(e) = email
            .send_welcome_email(user.email.as_str(), &user.name, &shop_url)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send welcome email");
        }
    }

    Ok(Redirect::to("/login?success=registered").into_response())
}

fn signup_error_text(err: &AuthError) -> String {
    match err {
        AuthError::UserAlreadyExists => "An account with this email already exists.".to_string(),
        AuthError::InvalidEmail(_) => "Please enter a valid email address.".to_string(),
        AuthError::MissingName => "Please enter your name.".to_string(),
        AuthError::PasswordMismatch => "Passwords have to match.".to_string(),
        AuthError::WeakPassword(msg) => capitalize(msg),
        other => other.to_string(),
    }
}

fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    chars.next().map_or_else(String::new, |first| {
        format!("{}{}.", first.to_uppercase(), chars.as_str())
    })
}

// =============================================================================
// Password Reset Routes
// =============================================================================

/// Display the reset request page.
pub async fn reset_page(page: PageContext) -> impl IntoResponse {
    ResetTemplate {
        page,
        error: None,
        email: String::new(),
    }
}

/// Create a reset token and email the link.
#[instrument(skip(state, session, page, form), fields(email = %form.email))]
pub async fn reset(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<ResetForm>,
) -> Result<Response> {
    verify_csrf(&session, &form.csrf).await?;

    let users = state.users();
    let (user, reset) = match AuthService::new(&users)
        .request_password_reset(&form.email, Utc::now())
        .await
    {
        Ok(found) => found,
        Err(AuthError::UserNotFound | AuthError::InvalidEmail(_)) => {
            return Ok(unprocessable(ResetTemplate {
                page,
                error: Some("No account with that email found.".to_string()),
                email: form.email,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let reset_url = state
        .config()
        .url_for(&format!("/new-password/{}", reset.token));
    match state.email() {
        Some(email) => {
            email
                .send_password_reset(user.email.as_str(), &user.name, &reset_url)
                .await
                .map_err(|e| AppError::Internal(format!("reset email failed: {e}")))?;
        }
        None => tracing::warn!(user_id = %user.id, "Email disabled, reset link not sent"),
    }

    Ok(Redirect::to("/login?success=reset_sent").into_response())
}

/// Display the new password form for a valid token.
pub async fn new_password_page(
    State(state): State<AppState>,
    page: PageContext,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let users = state.users();
    let user = AuthService::new(&users)
        .user_for_reset_token(&token, Utc::now())
        .await?;

    Ok(NewPasswordTemplate {
        page,
        error: None,
        user_id: user.id,
        token,
    })
}

/// Set the new password and invalidate the token.
#[instrument(skip(state, session, page, token, form), fields(user_id = form.user_id))]
pub async fn new_password(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Path(token): Path<String>,
    Form(form): Form<NewPasswordForm>,
) -> Result<Response> {
    verify_csrf(&session, &form.csrf).await?;

    let users = state.users();
    let user_id = UserId::new(form.user_id);
    match AuthService::new(&users)
        .complete_password_reset(user_id, &token, &form.password, Utc::now())
        .await
    {
        Ok(()) => Ok(Redirect::to("/login?success=password_reset").into_response()),
        Err(AuthError::WeakPassword(msg)) => Ok(unprocessable(NewPasswordTemplate {
            page,
            error: Some(capitalize(&msg)),
            user_id,
            token,
        })),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_error_text() {
        assert_eq!(
            signup_error_text(&AuthError::PasswordMismatch),
            "Passwords have to match."
        );
        assert_eq!(
            signup_error_text(&AuthError::WeakPassword(
                "password must be at least 5 characters".to_string()
            )),
            "Password must be at least 5 characters."
        );
    }
}
