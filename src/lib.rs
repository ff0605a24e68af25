//! GitGate: a device-admission gateway in front of GitHub Releases.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod signing;
pub mod upstream;

pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
