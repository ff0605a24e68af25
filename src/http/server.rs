//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the release routes
//! - Wire up middleware (request ID, tracing, timeout, security headers)
//! - Serve plain TCP or TLS with graceful shutdown
//! - Record per-route request metrics

use axum::{
    extract::{rejection::PathRejection, ConnectInfo, Path, Request, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::{Gateway, RequestContext, ResourceRequest};
use crate::observability::metrics;
use crate::security::headers;

const X_REQUEST_ID: &str = "x-request-id";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
/// Slack on top of the pipeline deadline before the transport gives up.
const TIMEOUT_BACKSTOP: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP front end for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>) -> Self {
        let router = Self::build_router(config, AppState { gateway });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/releases/{owner}/{repo}", get(list_releases_handler))
            .route(
                "/release/{owner}/{repo}/{version}/{asset}",
                get(download_asset_handler),
            )
            .with_state(state);

        headers::apply(router, &config.security).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(
                    Duration::from_secs(config.listener.request_timeout_secs) + TIMEOUT_BACKSTOP,
                )),
        )
    }

    /// The router without a listener, for embedding.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            signal.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(
                self.router
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

async fn health_handler() -> Response {
    let start = Instant::now();
    let body = Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }));
    metrics::record_request("health", 200, start);
    body.into_response()
}

async fn list_releases_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    request: Request,
) -> Response {
    match path {
        Ok(Path((owner, repo))) => {
            let resource = ResourceRequest::Releases {
                owner: &owner,
                repo: &repo,
            };
            dispatch(&state, "releases", Ok(resource), request).await
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Undecodable path parameters");
            dispatch(&state, "releases", Err("list_releases"), request).await
        }
    }
}

async fn download_asset_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String, String, String)>, PathRejection>,
    request: Request,
) -> Response {
    match path {
        Ok(Path((owner, repo, version, asset))) => {
            let resource = ResourceRequest::Asset {
                owner: &owner,
                repo: &repo,
                version: &version,
                asset: &asset,
            };
            dispatch(&state, "asset", Ok(resource), request).await
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Undecodable path parameters");
            dispatch(&state, "asset", Err("download_asset"), request).await
        }
    }
}

/// `resource` is `Err(action)` when the path parameters could not be decoded.
async fn dispatch(
    state: &AppState,
    route: &'static str,
    resource: Result<ResourceRequest<'_>, &'static str>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let (parts, _) = request.into_parts();
    let headers: &HeaderMap = &parts.headers;
    let request_id = headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok());
    let peer_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    tracing::debug!(
        request_id = request_id.unwrap_or("-"),
        route,
        "Handling request"
    );

    let ctx = RequestContext {
        headers,
        peer_ip,
        request_id,
    };
    let outcome = match resource {
        Ok(resource) => state.gateway.handle(ctx, resource).await,
        Err(action) => state.gateway.reject_malformed(ctx, action, parts.uri.path()),
    };
    let response = outcome.into_response();
    metrics::record_request(route, response.status().as_u16(), start);
    response
}
