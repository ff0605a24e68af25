//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → passed by reference to every component at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no process-wide singleton
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuditConfig, AuthConfig, AuthMethod, CacheConfig, CertificateAuthConfig, GatewayConfig,
    ListenerConfig, MaintenanceConfig, NetworkAuthConfig, ObservabilityConfig, RateLimitConfig,
    SecurityConfig, SigningConfig, TlsConfig, TokenAuthConfig, UpstreamConfig,
};
