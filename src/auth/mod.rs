//! Device authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → Authenticator (selected once from config)
//!         → token.rs        (identity API lookup)
//!         → network.rs      (device directory lookup)
//!         → certificate.rs  (client certificate chain)
//!     → Some(DeviceIdentity) | None
//! ```
//!
//! # Design Decisions
//! - The method set is closed; dispatch is a plain enum match
//! - Setup problems are `AuthSetupError`, raised once at startup
//! - Verification failures never propagate: log, then `None` (fail closed)

pub mod certificate;
pub mod network;
pub mod token;

use axum::http::{HeaderMap, HeaderName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::{AuthConfig, AuthMethod};
use crate::observability::metrics;

pub use certificate::CertificateAdapter;
pub use network::NetworkAdapter;
pub use token::TokenAdapter;

/// Sentinel used when a trust model cannot tell the caller's address.
pub const UNKNOWN_IP: &str = "unknown";

/// A device that passed verification. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_name: Option<String>,
    pub user_id: Option<String>,
    pub auth_method: AuthMethod,
    pub ip_address: String,
    pub verified_at: DateTime<Utc>,
}

impl DeviceIdentity {
    pub(crate) fn new(device_id: String, auth_method: AuthMethod, ip_address: String) -> Self {
        Self {
            device_id,
            device_name: None,
            user_id: None,
            auth_method,
            ip_address,
            verified_at: Utc::now(),
        }
    }
}

/// Fatal problems constructing an adapter.
#[derive(Debug, Error)]
pub enum AuthSetupError {
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to load CA certificate: {0}")]
    CaCertificate(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub(crate) fn header_name(field: &'static str, value: &str) -> Result<HeaderName, AuthSetupError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|e| AuthSetupError::InvalidSetting {
        field,
        reason: e.to_string(),
    })
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The configured trust model.
pub enum Authenticator {
    None,
    Token(TokenAdapter),
    Network(NetworkAdapter),
    Certificate(CertificateAdapter),
}

impl Authenticator {
    /// Build the adapter for the configured method.
    pub fn from_config(config: &AuthConfig, forwarded_for_header: &str) -> Result<Self, AuthSetupError> {
        let forwarded_for = header_name("security.forwarded_for_header", forwarded_for_header)?;
        let authenticator = match config.method {
            AuthMethod::None => Authenticator::None,
            AuthMethod::Token => {
                Authenticator::Token(TokenAdapter::new(&config.token, forwarded_for)?)
            }
            AuthMethod::Network => {
                Authenticator::Network(NetworkAdapter::new(&config.network, forwarded_for)?)
            }
            AuthMethod::Certificate => {
                Authenticator::Certificate(CertificateAdapter::new(&config.certificate)?)
            }
        };
        tracing::info!(method = %config.method, "Device authentication configured");
        Ok(authenticator)
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Authenticator::None => AuthMethod::None,
            Authenticator::Token(_) => AuthMethod::Token,
            Authenticator::Network(_) => AuthMethod::Network,
            Authenticator::Certificate(_) => AuthMethod::Certificate,
        }
    }

    /// Whether callers must present a verified identity.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Authenticator::None)
    }

    /// Verify the request's credentials.
    ///
    /// Always `None` in open mode; callers check `requires_auth` to tell open
    /// mode from a failed verification.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<DeviceIdentity> {
        let identity = match self {
            Authenticator::None => return None,
            Authenticator::Token(adapter) => adapter.verify(headers).await,
            Authenticator::Network(adapter) => adapter.verify(headers).await,
            Authenticator::Certificate(adapter) => adapter.verify(headers),
        };

        let method = self.method().as_str();
        match &identity {
            Some(id) => {
                tracing::debug!(method, device_id = %id.device_id, "Device verified");
                metrics::record_auth(method, "success");
            }
            None => metrics::record_auth(method, "failure"),
        }
        identity
    }
}
