//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the selected auth method has every setting it needs
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate outbound URLs with the same sanitizer used per request
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use url::{Host, Url};

use crate::config::schema::{AuthMethod, GatewayConfig};
use crate::security::sanitize;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a URL for an outbound service call.
///
/// HTTPS is required, except plain HTTP to a loopback host.
pub fn service_url(input: &str) -> Option<Url> {
    if let Some(url) = sanitize::https_url(input) {
        return Some(url);
    }
    let url = Url::parse(input.trim()).ok()?;
    let loopback = match url.host()? {
        Host::Domain(domain) => domain == "localhost",
        Host::Ipv4(ip) => IpAddr::V4(ip).is_loopback(),
        Host::Ipv6(ip) => IpAddr::V6(ip).is_loopback(),
    };
    let credentials = !url.username().is_empty() || url.password().is_some();
    (url.scheme() == "http" && loopback && !credentials).then_some(url)
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    let rl = &config.rate_limit;
    if rl.requests_per_window == 0 {
        errors.push(ValidationError::new("rate_limit.requests_per_window", "must be > 0"));
    }
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
    }
    if rl.lockout_step_secs == 0 || rl.lockout_max_secs < rl.lockout_step_secs {
        errors.push(ValidationError::new(
            "rate_limit.lockout_max_secs",
            "lockout step must be > 0 and not exceed the maximum",
        ));
    }
    if rl.max_tracked_keys == 0 {
        errors.push(ValidationError::new("rate_limit.max_tracked_keys", "must be > 0"));
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be > 0 when the cache is enabled"));
    }

    if service_url(&config.upstream.api_url).is_none() {
        errors.push(ValidationError::new("upstream.api_url", "must be an https URL without credentials"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be > 0"));
    }
    if config.upstream.release_list_limit == 0 || config.upstream.release_list_limit > 100 {
        errors.push(ValidationError::new("upstream.release_list_limit", "must be within 1..=100"));
    }

    check_header("security.forwarded_for_header", &config.security.forwarded_for_header, &mut errors);
    validate_auth(config, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "is not a socket address"));
    }

    if config.maintenance.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("maintenance.sweep_interval_secs", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_header(field: &'static str, name: &str, errors: &mut Vec<ValidationError>) {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a valid header name", name)));
    }
}

fn validate_auth(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let auth = &config.auth;
    match auth.method {
        AuthMethod::None => {}
        AuthMethod::Token => {
            match auth.token.identity_api_url.as_deref() {
                None => errors.push(ValidationError::new(
                    "auth.token.identity_api_url",
                    "required for token authentication",
                )),
                Some(url) if service_url(url).is_none() => errors.push(ValidationError::new(
                    "auth.token.identity_api_url",
                    "must be an https URL without credentials",
                )),
                Some(_) => {}
            }
            check_header("auth.token.header", &auth.token.header, errors);
            if auth.token.timeout_secs == 0 {
                errors.push(ValidationError::new("auth.token.timeout_secs", "must be > 0"));
            }
        }
        AuthMethod::Network => {
            if service_url(&auth.network.api_url).is_none() {
                errors.push(ValidationError::new(
                    "auth.network.api_url",
                    "must be an https URL without credentials",
                ));
            }
            let tailnet_ok = auth.network.tailnet.as_deref().is_some_and(|t| {
                !t.is_empty() && t.len() <= 253 && !t.contains(['/', '\\', '?', '#']) && !t.contains("..")
            });
            if !tailnet_ok {
                errors.push(ValidationError::new(
                    "auth.network.tailnet",
                    "required for network authentication",
                ));
            }
            if auth.network.api_key.as_deref().is_none_or(str::is_empty) {
                errors.push(ValidationError::new(
                    "auth.network.api_key",
                    "required for network authentication",
                ));
            }
            check_header("auth.network.user_header", &auth.network.user_header, errors);
            check_header("auth.network.device_header", &auth.network.device_header, errors);
            check_header("auth.network.ip_header", &auth.network.ip_header, errors);
            if auth.network.timeout_secs == 0 {
                errors.push(ValidationError::new("auth.network.timeout_secs", "must be > 0"));
            }
        }
        AuthMethod::Certificate => {
            if auth.certificate.ca_cert_path.is_none() {
                errors.push(ValidationError::new(
                    "auth.certificate.ca_cert_path",
                    "required for certificate authentication",
                ));
            }
            check_header("auth.certificate.header", &auth.certificate.header, errors);
        }
    }
}
