//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Device authentication settings.
    pub auth: AuthConfig,

    /// Per-device rate limiting.
    pub rate_limit: RateLimitConfig,

    /// On-disk response cache.
    pub cache: CacheConfig,

    /// Detached signing of served assets.
    pub signing: SigningConfig,

    /// Upstream release source (GitHub).
    pub upstream: UpstreamConfig,

    /// Audit trail output.
    pub audit: AuditConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Background maintenance.
    pub maintenance: MaintenanceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Total time allowed for one request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 60,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Which trust model admits devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// No authentication; every caller is anonymous but admitted.
    #[default]
    None,
    /// Delegated API-token lookup.
    Token,
    /// Network-identity lookup against a device directory.
    Network,
    /// Client certificate chain verification.
    Certificate,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Token => "token",
            AuthMethod::Network => "network",
            AuthMethod::Certificate => "certificate",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Active trust model.
    pub method: AuthMethod,

    pub token: TokenAuthConfig,

    pub network: NetworkAuthConfig,

    pub certificate: CertificateAuthConfig,
}

/// Token-delegated adapter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenAuthConfig {
    /// Identity API endpoint that resolves a device token.
    pub identity_api_url: Option<String>,

    /// Header carrying the device token.
    pub header: String,

    /// Lookup timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TokenAuthConfig {
    fn default() -> Self {
        Self {
            identity_api_url: None,
            header: "x-device-token".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Network-identity adapter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkAuthConfig {
    /// Device directory API base URL.
    pub api_url: String,

    /// Tailnet (or organization) whose device list is queried.
    pub tailnet: Option<String>,

    /// API key for the device directory. `GITGATE_DEVICE_API_KEY` overrides.
    pub api_key: Option<String>,

    /// Header carrying the user identity.
    pub user_header: String,

    /// Header carrying the claimed device id.
    pub device_header: String,

    /// Header carrying the device's network address, if the edge sets one.
    pub ip_header: String,

    /// Lookup timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NetworkAuthConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tailscale.com".to_string(),
            tailnet: None,
            api_key: None,
            user_header: "x-device-user".to_string(),
            device_header: "x-device-id".to_string(),
            ip_header: "x-device-ip".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Certificate-chain adapter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertificateAuthConfig {
    /// CA certificate (PEM) that must have signed device certificates.
    pub ca_cert_path: Option<PathBuf>,

    /// Header carrying the URL-encoded client certificate PEM.
    pub header: String,
}

impl Default for CertificateAuthConfig {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            header: "x-client-cert".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per key per window.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Lockout added per consecutive violation, in seconds.
    pub lockout_step_secs: u64,

    /// Longest lockout, in seconds.
    pub lockout_max_secs: u64,

    /// Most keys held at once. Reaching it forces a sweep; new keys beyond it
    /// are admitted untracked.
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_secs: 60,
            lockout_step_secs: 60,
            lockout_max_secs: 15 * 60,
            max_tracked_keys: 100_000,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the on-disk cache.
    pub enabled: bool,

    /// Cache directory.
    pub directory: PathBuf,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./cache"),
            ttl_secs: 3600,
        }
    }
}

/// Asset signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SigningConfig {
    /// RSA private key (PEM). Signing is off when unset.
    pub private_key_path: Option<PathBuf>,
}

/// Upstream release source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// GitHub REST API base URL.
    pub api_url: String,

    /// API token. `GITGATE_GITHUB_TOKEN` overrides.
    pub token: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum releases returned by the list route.
    pub release_list_limit: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 30,
            release_list_limit: 30,
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file for audit events. Events go to the log when unset.
    pub file_path: Option<PathBuf>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,

    /// Header supplying the client IP when no identity header does.
    pub forwarded_for_header: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            forwarded_for_header: "x-forwarded-for".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between rate-limiter and cache sweeps, in seconds. Must be > 0.
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
        }
    }
}
