//! Network-identity device verification.
//!
//! The network edge (e.g. a mesh VPN proxy) stamps user and device headers on
//! each request. The claimed device is then confirmed against the device
//! directory API before it is trusted.

use axum::http::{HeaderMap, HeaderName};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::auth::{header_name, header_str, AuthSetupError, DeviceIdentity};
use crate::config::validation::service_url;
use crate::config::{AuthMethod, NetworkAuthConfig};
use crate::security::sanitize;

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DirectoryDevice>,
}

#[derive(Debug, Deserialize)]
struct DirectoryDevice {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct NetworkAdapter {
    client: reqwest::Client,
    devices_url: Url,
    api_key: String,
    user_header: HeaderName,
    device_header: HeaderName,
    ip_header: HeaderName,
    forwarded_for: HeaderName,
}

impl NetworkAdapter {
    pub fn new(config: &NetworkAuthConfig, forwarded_for: HeaderName) -> Result<Self, AuthSetupError> {
        let tailnet = config
            .tailnet
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthSetupError::MissingSetting("auth.network.tailnet"))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(AuthSetupError::MissingSetting("auth.network.api_key"))?;

        let raw = format!(
            "{}/api/v2/tailnet/{}/devices",
            config.api_url.trim_end_matches('/'),
            urlencoding::encode(tailnet)
        );
        let devices_url = service_url(&raw).ok_or_else(|| AuthSetupError::InvalidSetting {
            field: "auth.network.api_url",
            reason: "must be an https URL without credentials".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gitgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            devices_url,
            api_key,
            user_header: header_name("auth.network.user_header", &config.user_header)?,
            device_header: header_name("auth.network.device_header", &config.device_header)?,
            ip_header: header_name("auth.network.ip_header", &config.ip_header)?,
            forwarded_for,
        })
    }

    pub async fn verify(&self, headers: &HeaderMap) -> Option<DeviceIdentity> {
        let user = header_str(headers, &self.user_header).and_then(sanitize::user_id);
        let device = header_str(headers, &self.device_header).and_then(sanitize::device_id);
        let (Some(user), Some(device)) = (user, device) else {
            tracing::debug!("Missing or invalid network identity headers");
            return None;
        };

        let response = match self
            .client
            .get(self.devices_url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "Device directory request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Device directory returned an error");
            return None;
        }

        let list: DeviceList = match response.json().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Device directory returned a malformed body");
                return None;
            }
        };

        let Some(entry) = list.devices.iter().find(|d| d.id == device) else {
            tracing::warn!(device_id = %device, user = %user, "Device not found in directory");
            return None;
        };

        let ip = header_str(headers, &self.ip_header)
            .and_then(sanitize::parse_ip)
            .unwrap_or_else(|| sanitize::client_ip(header_str(headers, &self.forwarded_for)));

        let mut identity = DeviceIdentity::new(device, AuthMethod::Network, ip.to_string());
        identity.device_name = entry
            .name
            .as_deref()
            .and_then(|name| sanitize::header_value(name, sanitize::MAX_USER_ID_LEN))
            .map(str::to_string);
        identity.user_id = Some(user);
        Some(identity)
    }
}
