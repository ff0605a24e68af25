//! GitGate server.
//!
//! # Architecture Overview
//!
//! ```text
//!   Device request
//!     │
//!     ▼
//!   http::server ──▶ gateway::pipeline
//!                      │ 1. sanitize path inputs
//!                      │ 2. auth::Authenticator (token | network | certificate | none)
//!                      │ 3. security::rate_limit (device id or anon:<ip>)
//!                      │ 4. cache (checksum-verified, TTL)
//!                      │ 5. upstream::GitHubClient on miss
//!                      │ 6. signing (optional detached signature)
//!                      │ 7. audit (exactly one record)
//!                      ▼
//!   Response + X-Checksum-SHA256 / X-Signature-RSA-SHA256 / X-RateLimit-*
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;

use gitgate::config::{load_config, ObservabilityConfig};
use gitgate::http::HttpServer;
use gitgate::lifecycle::startup::{self, StartupError};
use gitgate::lifecycle::{maintenance, Shutdown};
use gitgate::net::tls::load_tls_config;
use gitgate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gitgate", version, about = "Device-admission gateway for GitHub Releases")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "GITGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be configured yet when the config itself failed.
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        auth_method = %config.auth.method,
        cache_enabled = config.cache.enabled,
        "gitgate starting"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(startup::parse_addr(&config.observability.metrics_address)?);
    }

    let gateway = startup::build_gateway(&config)?;
    let server = HttpServer::new(&config, gateway.clone());

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    let sweeper = maintenance::spawn_sweeper(
        gateway,
        Duration::from_secs(config.maintenance.sweep_interval_secs),
        shutdown.subscribe(),
    );

    let served = match &config.listener.tls {
        Some(tls) => {
            let tls_config = load_tls_config(tls).await.map_err(StartupError::Tls)?;
            let addr = startup::parse_addr(&config.listener.bind_address)?;
            server.run_tls(addr, tls_config, shutdown.subscribe()).await
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address)
                .await
                .map_err(StartupError::Bind)?;
            server.run(listener, shutdown.subscribe()).await
        }
    };

    shutdown.trigger();
    let _ = sweeper.await;
    served.map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
