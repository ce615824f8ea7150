//! Stripe Checkout client.
//!
//! Creates hosted Checkout Sessions for a cart and reads them back after the
//! customer returns. Requests are form encoded with amounts in minor units,
//! as the Stripe REST API expects.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use emporium_core::{Cart, Price, UserId};

use crate::config::PaymentConfig;

/// Errors from the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Transport failure or undecodable response.
    #[error("payment request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe answered with an error.
    #[error("payment provider returned {status}: {message}")]
    Provider {
        status: reqwest::StatusCode,
        message: String,
    },

    /// A price does not fit in Stripe's integer amount.
    #[error("amount {0} cannot be expressed in minor units")]
    AmountOutOfRange(Price),

    /// The session has no hosted checkout URL.
    #[error("checkout session {0} has no redirect URL")]
    MissingUrl(String),
}

/// One line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLineItem {
    pub name: String,
    pub description: String,
    pub unit_price: Price,
    pub quantity: u32,
}

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

impl CheckoutSession {
    /// The hosted page to redirect the customer to.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::MissingUrl` if Stripe did not provide one.
    pub fn redirect_url(&self) -> Result<&str, PaymentError> {
        self.url
            .as_deref()
            .ok_or_else(|| PaymentError::MissingUrl(self.id.clone()))
    }
}

/// The state of a session when the customer comes back.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionStatus {
    pub id: String,
    pub payment_status: String,
    pub client_reference_id: Option<String>,
    /// Amount charged, in minor units.
    pub amount_total: Option<i64>,
}

impl CheckoutSessionStatus {
    /// Whether the payment for this session has been collected.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Whether the session was created for `user_id`.
    #[must_use]
    pub fn belongs_to(&self, user_id: UserId) -> bool {
        self.client_reference_id.as_deref() == Some(user_id.to_string().as_str())
    }

    /// Whether the amount charged is exactly the cart's total.
    ///
    /// A cart that grew or shrank after the session was created does not
    /// match.
    #[must_use]
    pub fn charged_for(&self, cart: &Cart) -> bool {
        self.amount_total
            .is_some_and(|paid| cart.total_minor_units() == Some(paid))
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Client for Stripe Checkout Sessions.
#[derive(Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    secret_key: SecretString,
    currency: String,
    api_base: String,
}

impl PaymentClient {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            currency: config.currency.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create a hosted checkout session for `items`.
    ///
    /// `success_url` may contain Stripe's `{CHECKOUT_SESSION_ID}` placeholder.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` if an amount is out of range or the request
    /// fails.
    #[instrument(skip(self, items, success_url, cancel_url), fields(items = items.len()))]
    pub async fn create_checkout_session(
        &self,
        user_id: UserId,
        customer_email: &str,
        items: &[PaymentLineItem],
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let params = checkout_form_params(
            &self.currency,
            user_id,
            customer_email,
            items,
            success_url,
            cancel_url,
        )?;

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        let session: CheckoutSession = decode(response).await?;
        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Fetch a checkout session by ID.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_base,
                urlencoding::encode(session_id)
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        decode(response).await
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = response
        .json::<StripeErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| "unknown error".to_string());
    tracing::warn!(%status, %message, "Stripe request rejected");
    Err(PaymentError::Provider { status, message })
}

/// Build the form body for `POST /v1/checkout/sessions`.
fn checkout_form_params(
    currency: &str,
    user_id: UserId,
    customer_email: &str,
    items: &[PaymentLineItem],
    success_url: &str,
    cancel_url: &str,
) -> Result<Vec<(String, String)>, PaymentError> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), success_url.to_string()),
        ("cancel_url".to_string(), cancel_url.to_string()),
        ("client_reference_id".to_string(), user_id.to_string()),
        ("customer_email".to_string(), customer_email.to_string()),
    ];

    for (i, item) in items.iter().enumerate() {
        let amount = item
            .unit_price
            .minor_units()
            .ok_or(PaymentError::AmountOutOfRange(item.unit_price))?;
        let prefix = format!("line_items[{i}]");
        params.extend([
            (format!("{prefix}[quantity]"), item.quantity.to_string()),
            (
                format!("{prefix}[price_data][currency]"),
                currency.to_string(),
            ),
            (format!("{prefix}[price_data][unit_amount]"), amount.to_string()),
            (
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ),
        ]);
        if !item.description.is_empty() {
            params.push((
                format!("{prefix}[price_data][product_data][description]"),
                item.description.clone(),
            ));
        }
    }

    Ok(params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emporium_core::ProductId;

    fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_line_items_use_minor_units() {
        let items = vec![
            PaymentLineItem {
                name: "Lamp".to_string(),
                description: "Brass desk lamp".to_string(),
                unit_price: Price::parse("19.99").unwrap(),
                quantity: 2,
            },
            PaymentLineItem {
                name: "Rug".to_string(),
                description: String::new(),
                unit_price: Price::parse("5").unwrap(),
                quantity: 1,
            },
        ];

        let params = checkout_form_params(
            "inr",
            UserId::new(7),
            "ada@example.com",
            &items,
            "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}",
            "https://shop.test/checkout/cancel",
        )
        .unwrap();

        assert_eq!(lookup(&params, "mode"), Some("payment"));
        assert_eq!(lookup(&params, "client_reference_id"), Some("7"));
        assert_eq!(
            lookup(&params, "line_items[0][price_data][unit_amount]"),
            Some("1999")
        );
        assert_eq!(lookup(&params, "line_items[0][quantity]"), Some("2"));
        assert_eq!(
            lookup(&params, "line_items[1][price_data][unit_amount]"),
            Some("500")
        );
        assert_eq!(
            lookup(&params, "line_items[1][price_data][currency]"),
            Some("inr")
        );
        assert!(lookup(&params, "line_items[1][price_data][product_data][description]").is_none());
    }

    #[test]
    fn test_session_status_helpers() {
        let status = CheckoutSessionStatus {
            id: "cs_test_1".to_string(),
            payment_status: "paid".to_string(),
            client_reference_id: Some("3".to_string()),
            amount_total: Some(1250),
        };
        assert!(status.is_paid());
        assert!(status.belongs_to(UserId::new(3)));
        assert!(!status.belongs_to(UserId::new(4)));

        let unpaid = CheckoutSessionStatus {
            payment_status: "unpaid".to_string(),
            ..status
        };
        assert!(!unpaid.is_paid());
    }

    #[test]
    fn test_session_must_match_cart_total() {
        let status = CheckoutSessionStatus {
            id: "cs_test_2".to_string(),
            payment_status: "paid".to_string(),
            client_reference_id: Some("3".to_string()),
            amount_total: Some(1250),
        };
        let mut cart = Cart::empty();
        cart.add_product(ProductId::new(1), Price::parse("12.50").unwrap())
            .unwrap();
        assert!(status.charged_for(&cart));

        // Refilled after paying
        cart.add_product(ProductId::new(2), Price::parse("99").unwrap())
            .unwrap();
        assert!(!status.charged_for(&cart));

        let missing = CheckoutSessionStatus {
            amount_total: None,
            ..status
        };
        assert!(!missing.charged_for(&Cart::empty()));
    }
}
