//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::Path as UrlPath;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use gitgate::audit::MemoryAuditSink;
use gitgate::config::GatewayConfig;
use gitgate::upstream::{Asset, Release, ReleaseSource, UpstreamError};
use gitgate::{Gateway, HttpServer, Shutdown};

pub const GOOD_TOKEN: &str = "good-token";
pub const DIRECTORY_KEY: &str = "directory-key";
pub const TOOL_BYTES: &[u8] = b"tool-binary-v1.0.0";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Identity API mock. Returns its address and a call counter.
///
/// Tokens: `good-token` resolves to `device-001`; `bad-id` returns an
/// unusable device id; `garbled` returns a non-JSON body; anything else 401.
pub async fn start_identity_api() -> (SocketAddr, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let router = Router::new().route(
        "/v1/identity",
        get(move |headers: HeaderMap| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match bearer(&headers) {
                    Some(GOOD_TOKEN) => Json(serde_json::json!({
                        "deviceId": "device-001",
                        "deviceName": "Build Laptop",
                        "userId": "alice@example.com",
                    }))
                    .into_response(),
                    Some("bad-id") => {
                        Json(serde_json::json!({ "device_id": "bad id; drop" })).into_response()
                    }
                    Some("garbled") => (StatusCode::OK, "<html>").into_response(),
                    _ => StatusCode::UNAUTHORIZED.into_response(),
                }
            }
        }),
    );
    (serve(router).await, calls)
}

/// Device directory mock for tailnet `example.com`.
pub async fn start_device_directory() -> SocketAddr {
    let router = Router::new().route(
        "/api/v2/tailnet/{tailnet}/devices",
        get(|UrlPath(tailnet): UrlPath<String>, headers: HeaderMap| async move {
            if bearer(&headers) != Some(DIRECTORY_KEY) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if tailnet != "example.com" {
                return StatusCode::NOT_FOUND.into_response();
            }
            Json(serde_json::json!({
                "devices": [
                    { "id": "node-abc", "name": "ci-runner.example.com", "os": "linux" },
                    { "id": "node-def", "name": "laptop.example.com" }
                ]
            }))
            .into_response()
        }),
    );
    serve(router).await
}

fn github_release() -> serde_json::Value {
    serde_json::json!({
        "id": 1,
        "tag_name": "v1.0.0",
        "name": "1.0.0",
        "draft": false,
        "prerelease": false,
        "published_at": "2024-05-01T10:00:00Z",
        "assets": [
            { "id": 11, "name": "tool.tar.gz", "size": TOOL_BYTES.len(), "content_type": "application/gzip" },
            { "id": 13, "name": "broken.zip", "size": 1 }
        ]
    })
}

/// Fake GitHub REST API for `acme/tool`. Requires bearer `gh-token`.
pub async fn start_fake_github() -> SocketAddr {
    fn authorized(headers: &HeaderMap) -> bool {
        bearer(headers) == Some("gh-token")
    }

    let router = Router::new()
        .route(
            "/repos/acme/tool/releases",
            get(|headers: HeaderMap| async move {
                if !authorized(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                Json(serde_json::json!([github_release()])).into_response()
            }),
        )
        .route(
            "/repos/acme/tool/releases/latest",
            get(|| async { Json(github_release()) }),
        )
        .route(
            "/repos/acme/tool/releases/tags/{tag}",
            get(|UrlPath(tag): UrlPath<String>| async move {
                if tag == "v1.0.0" {
                    Json(github_release()).into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }),
        )
        .route(
            "/repos/acme/tool/releases/assets/{id}",
            get(|UrlPath(id): UrlPath<u64>, headers: HeaderMap| async move {
                let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
                if accept != Some("application/octet-stream") {
                    return StatusCode::NOT_ACCEPTABLE.into_response();
                }
                match id {
                    11 => (StatusCode::OK, Bytes::from_static(TOOL_BYTES)).into_response(),
                    13 => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    _ => StatusCode::NOT_FOUND.into_response(),
                }
            }),
        );
    serve(router).await
}

/// In-memory release source that counts calls.
#[derive(Default)]
pub struct FakeReleaseSource {
    releases: HashMap<String, Vec<Release>>,
    blobs: HashMap<u64, Bytes>,
    failing_assets: Vec<u64>,
    pub offline: AtomicBool,
    /// Delay applied to every call, in milliseconds.
    pub latency_ms: AtomicU64,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl FakeReleaseSource {
    /// `acme/tool` with release `v1.0.0` carrying:
    /// - `tool.tar.gz` (id 11): downloadable
    /// - `ghost.bin` (id 12): listed, but download finds nothing
    /// - `broken.zip` (id 13): download fails
    pub fn with_tool_release() -> Arc<Self> {
        let asset = |id, name: &str| Asset {
            id,
            name: name.to_string(),
            size: 0,
            content_type: None,
            browser_download_url: None,
        };
        let release = Release {
            id: 1,
            tag_name: "v1.0.0".into(),
            name: Some("1.0.0".into()),
            draft: false,
            prerelease: false,
            published_at: Some("2024-05-01T10:00:00Z".into()),
            body: None,
            html_url: None,
            assets: vec![
                asset(11, "tool.tar.gz"),
                asset(12, "ghost.bin"),
                asset(13, "broken.zip"),
            ],
        };

        let mut source = Self::default();
        source.releases.insert("acme/tool".into(), vec![release]);
        source.blobs.insert(11, Bytes::from_static(TOOL_BYTES));
        source.failing_assets.push(13);
        Arc::new(source)
    }

    pub fn upstream_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.get_calls.load(Ordering::SeqCst)
            + self.download_calls.load(Ordering::SeqCst)
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    async fn lag(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn get_release(&self, owner: &str, repo: &str, tag: &str) -> Option<Release> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        if self.is_offline() {
            return None;
        }
        let releases = self.releases.get(&format!("{}/{}", owner, repo))?;
        if tag == "latest" {
            return releases.first().cloned();
        }
        releases.iter().find(|r| r.tag_name == tag).cloned()
    }

    async fn list_releases(&self, owner: &str, repo: &str, limit: u32) -> Vec<Release> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        if self.is_offline() {
            return Vec::new();
        }
        self.releases
            .get(&format!("{}/{}", owner, repo))
            .map(|r| r.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default()
    }

    async fn download_asset(
        &self,
        _owner: &str,
        _repo: &str,
        asset_id: u64,
    ) -> Result<Option<Bytes>, UpstreamError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        if self.is_offline() || self.failing_assets.contains(&asset_id) {
            return Err(UpstreamError::Status(503));
        }
        Ok(self.blobs.get(&asset_id).cloned())
    }
}

/// Default configuration with the cache pointed at a fresh temp dir.
pub fn test_config() -> (GatewayConfig, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.cache.directory = dir.path().join("cache");
    (config, dir)
}

/// A running gateway with its collaborators exposed for assertions.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub source: Arc<FakeReleaseSource>,
    pub audit: MemoryAuditSink,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig, source: Arc<FakeReleaseSource>) -> TestGateway {
    let audit = MemoryAuditSink::new();
    let gateway = Arc::new(Gateway::new(&config, source.clone(), Arc::new(audit.clone())).unwrap());
    let server = HttpServer::new(&config, gateway.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestGateway {
        addr,
        gateway,
        source,
        audit,
        shutdown,
    }
}

pub fn header<'a>(res: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}
