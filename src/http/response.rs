//! Gateway outcome to HTTP response.
//!
//! # Responsibilities
//! - Attach rate-limit headers whenever a key was consumed
//! - Attach checksum and signature headers to served payloads
//! - Render failures as a generic JSON error body

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::gateway::{Outcome, Served};
use crate::security::rate_limit::RateLimitDecision;

pub const X_CHECKSUM_SHA256: HeaderName = HeaderName::from_static("x-checksum-sha256");
pub const X_SIGNATURE_RSA_SHA256: HeaderName = HeaderName::from_static("x-signature-rsa-sha256");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub fn rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs()));
}

impl IntoResponse for Served {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, self.body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        if let Ok(value) = HeaderValue::from_str(&self.checksum) {
            headers.insert(X_CHECKSUM_SHA256, value);
        }
        if let Some(value) = self
            .signature
            .as_deref()
            .and_then(|s| HeaderValue::from_str(s).ok())
        {
            headers.insert(X_SIGNATURE_RSA_SHA256, value);
        }
        response
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let mut response = match self.result {
            Ok(served) => served.into_response(),
            Err(err) => err.into_response(),
        };
        if let Some(decision) = &self.rate_limit {
            rate_limit_headers(response.headers_mut(), decision);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use bytes::Bytes;

    fn decision(allowed: bool, remaining: u32) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            limit: 60,
            remaining,
            reset_at_ms: 1_700_000_000_001,
        }
    }

    #[test]
    fn test_served_headers() {
        let outcome = Outcome {
            result: Ok(Served {
                body: Bytes::from_static(b"bin"),
                content_type: "application/octet-stream",
                checksum: "ab".repeat(32),
                signature: Some("c2ln".into()),
                cached: false,
            }),
            rate_limit: Some(decision(true, 59)),
        };
        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers[X_CHECKSUM_SHA256], "ab".repeat(32).as_str());
        assert_eq!(headers[X_SIGNATURE_RSA_SHA256], "c2ln");
        assert_eq!(headers[X_RATELIMIT_LIMIT], "60");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "59");
        assert_eq!(headers[X_RATELIMIT_RESET], "1700000001");
    }

    #[test]
    fn test_failure_keeps_rate_limit_headers() {
        let outcome = Outcome {
            result: Err(GatewayError::Unauthorized),
            rate_limit: Some(decision(true, 10)),
        };
        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "10");
        assert!(response.headers().get(X_CHECKSUM_SHA256).is_none());
    }

    #[test]
    fn test_validation_failure_has_no_rate_limit_headers() {
        let outcome = Outcome {
            result: Err(GatewayError::Validation("owner")),
            rate_limit: None,
        };
        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
    }
}
