//! Request correlation IDs.
//!
//! Each request gets an ID that shows up in the `http_request` span, on the
//! Sentry scope and in the `x-request-id` response header. An ID supplied by
//! an upstream proxy is reused when it looks sane; anything else is replaced
//! with a fresh UUID v4 so client input never reaches the logs verbatim.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream ID that is passed through.
const MAX_UPSTREAM_ID_LEN: usize = 64;

/// Reuse `upstream` if it is short and limited to `[A-Za-z0-9-_.]`.
fn accept_upstream(upstream: Option<&str>) -> Option<String> {
    upstream
        .filter(|id| !id.is_empty() && id.len() <= MAX_UPSTREAM_ID_LEN)
        .filter(|id| {
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
        .map(String::from)
}

/// Attach a request ID to the span, the Sentry scope and the response.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let upstream = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok());
    let request_id =
        accept_upstream(upstream).unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", &request_id);
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_id_reused_when_sane() {
        assert_eq!(
            accept_upstream(Some("cf-8a1b2c.3")),
            Some("cf-8a1b2c.3".to_string())
        );
    }

    #[test]
    fn test_upstream_id_rejected_when_odd() {
        assert_eq!(accept_upstream(None), None);
        assert_eq!(accept_upstream(Some("")), None);
        assert_eq!(accept_upstream(Some("id with spaces")), None);
        assert_eq!(accept_upstream(Some("x\nforged=1")), None);
        assert_eq!(accept_upstream(Some(&"a".repeat(65))), None);
    }
}
