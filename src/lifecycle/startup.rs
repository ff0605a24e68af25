//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into a ready `Gateway`
//! - Choose the audit sink
//! - Bind the listener and load TLS material
//!
//! # Design Decisions
//! - Fail fast: any error here is fatal
//! - Listeners bind last, after every component constructed cleanly

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::{AuditSink, JsonLinesAuditSink, TracingAuditSink};
use crate::auth::AuthSetupError;
use crate::config::{AuditConfig, ConfigError, GatewayConfig};
use crate::gateway::Gateway;
use crate::upstream::GitHubClient;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("authentication setup failed: {0}")]
    Auth(#[from] AuthSetupError),

    #[error("failed to build upstream client: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("invalid address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Audit sink for the configured destination. Must run inside a runtime.
pub fn audit_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    match &config.file_path {
        Some(path) => Arc::new(JsonLinesAuditSink::spawn(path.clone())),
        None => Arc::new(TracingAuditSink),
    }
}

/// Build the gateway against GitHub.
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<Gateway>, StartupError> {
    let source = GitHubClient::new(&config.upstream).map_err(StartupError::Upstream)?;
    tracing::info!(api_url = %config.upstream.api_url, "Release source configured");
    let gateway = Gateway::new(config, Arc::new(source), audit_sink(&config.audit))?;
    Ok(Arc::new(gateway))
}

pub fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|source| StartupError::Address {
        address: address.to_string(),
        source,
    })
}
