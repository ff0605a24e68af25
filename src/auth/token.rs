//! Token-delegated device verification.
//!
//! The device presents an opaque token; an external identity API resolves it
//! to a device record.

use axum::http::{HeaderMap, HeaderName};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::auth::{header_name, header_str, AuthSetupError, DeviceIdentity};
use crate::config::validation::service_url;
use crate::config::{AuthMethod, TokenAuthConfig};
use crate::security::sanitize;

/// Identity API response body.
#[derive(Debug, Deserialize)]
struct IdentityResponse {
    #[serde(alias = "deviceId")]
    device_id: String,
    #[serde(default, alias = "deviceName")]
    device_name: Option<String>,
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
}

pub struct TokenAdapter {
    client: reqwest::Client,
    identity_url: Url,
    header: HeaderName,
    forwarded_for: HeaderName,
}

impl TokenAdapter {
    pub fn new(config: &TokenAuthConfig, forwarded_for: HeaderName) -> Result<Self, AuthSetupError> {
        let raw = config
            .identity_api_url
            .as_deref()
            .ok_or(AuthSetupError::MissingSetting("auth.token.identity_api_url"))?;
        let identity_url = service_url(raw).ok_or_else(|| AuthSetupError::InvalidSetting {
            field: "auth.token.identity_api_url",
            reason: "must be an https URL without credentials".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gitgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            identity_url,
            header: header_name("auth.token.header", &config.header)?,
            forwarded_for,
        })
    }

    pub async fn verify(&self, headers: &HeaderMap) -> Option<DeviceIdentity> {
        let Some(raw) = header_str(headers, &self.header) else {
            tracing::debug!(header = %self.header, "No device token presented");
            return None;
        };
        let Some(token) = sanitize::token(raw) else {
            tracing::warn!("Rejected malformed device token");
            return None;
        };

        let response = match self
            .client
            .get(self.identity_url.clone())
            .bearer_auth(&token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "Identity API request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Identity API rejected device token");
            return None;
        }

        let body: IdentityResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Identity API returned a malformed body");
                return None;
            }
        };

        let Some(device_id) = sanitize::device_id(&body.device_id) else {
            tracing::warn!("Identity API returned an invalid device id");
            return None;
        };

        let ip = sanitize::client_ip(header_str(headers, &self.forwarded_for));
        let mut identity = DeviceIdentity::new(device_id, AuthMethod::Token, ip.to_string());
        identity.device_name = body
            .device_name
            .as_deref()
            .and_then(|name| sanitize::header_value(name, sanitize::MAX_USER_ID_LEN))
            .map(str::to_string);
        identity.user_id = body.user_id.as_deref().and_then(sanitize::user_id);
        Some(identity)
    }
}
