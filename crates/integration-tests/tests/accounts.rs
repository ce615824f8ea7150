//! Signup, login and password reset.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};

use emporium_integration_tests::MemoryStore;
use emporium_storefront::services::{AuthError, AuthService};

#[tokio::test]
async fn test_signup_then_login() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);

    let user = auth
        .register("Alice", "alice@example.com", "secret1", "secret1")
        .await
        .unwrap();
    assert!(user.cart.is_empty());

    let logged_in = auth.login("alice@example.com", "secret1").await.unwrap();
    assert_eq!(logged_in.id, user.id);

    let err = auth.login("alice@example.com", "wrong1").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);
    auth.register("Alice", "alice@example.com", "secret1", "secret1")
        .await
        .unwrap();

    let err = auth
        .register("Other", "alice@example.com", "secret2", "secret2")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists));
}

#[tokio::test]
async fn test_reset_token_works_once() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);
    let user = auth
        .register("Alice", "alice@example.com", "secret1", "secret1")
        .await
        .unwrap();
    let now = Utc::now();

    let (_, reset) = auth
        .request_password_reset("alice@example.com", now)
        .await
        .unwrap();
    let holder = auth.user_for_reset_token(&reset.token, now).await.unwrap();
    assert_eq!(holder.id, user.id);

    auth.complete_password_reset(user.id, &reset.token, "newpass1", now)
        .await
        .unwrap();
    auth.login("alice@example.com", "newpass1").await.unwrap();

    let err = auth
        .complete_password_reset(user.id, &reset.token, "another1", now)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResetToken));
}

#[tokio::test]
async fn test_expired_reset_token_is_rejected() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);
    let user = auth
        .register("Alice", "alice@example.com", "secret1", "secret1")
        .await
        .unwrap();
    let issued = Utc::now();
    let (_, reset) = auth
        .request_password_reset("alice@example.com", issued)
        .await
        .unwrap();

    let later = issued + Duration::hours(2);
    let err = auth
        .user_for_reset_token(&reset.token, later)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResetToken));

    let err = auth
        .complete_password_reset(user.id, &reset.token, "newpass1", later)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResetToken));
    auth.login("alice@example.com", "secret1").await.unwrap();
}
