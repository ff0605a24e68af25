//! GitHub Releases client.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::upstream::{Release, ReleaseSource, UpstreamError};

const API_VERSION: &str = "2022-11-28";

/// Release source backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gitgate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, path: &str, accept: &'static str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, accept);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned + Send>(&self, op: &'static str, path: &str) -> Option<T> {
        let response = match self.request(path, "application/vnd.github+json").send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(op, path, error = %e, "GitHub request failed");
                metrics::record_upstream(op, "error");
                return None;
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            metrics::record_upstream(op, "not_found");
            return None;
        }
        if !status.is_success() {
            tracing::warn!(op, path, status = %status, "GitHub returned an error status");
            metrics::record_upstream(op, "error");
            return None;
        }

        match response.json::<T>().await {
            Ok(body) => {
                metrics::record_upstream(op, "ok");
                Some(body)
            }
            Err(e) => {
                tracing::warn!(op, path, error = %e, "GitHub returned a malformed body");
                metrics::record_upstream(op, "error");
                None
            }
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn get_release(&self, owner: &str, repo: &str, tag: &str) -> Option<Release> {
        let path = if tag == "latest" {
            format!("/repos/{}/{}/releases/latest", owner, repo)
        } else {
            format!("/repos/{}/{}/releases/tags/{}", owner, repo, urlencoding::encode(tag))
        };
        self.get_json("get_release", &path).await
    }

    async fn list_releases(&self, owner: &str, repo: &str, limit: u32) -> Vec<Release> {
        let path = format!("/repos/{}/{}/releases?per_page={}", owner, repo, limit.clamp(1, 100));
        self.get_json("list_releases", &path).await.unwrap_or_default()
    }

    async fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        asset_id: u64,
    ) -> Result<Option<Bytes>, UpstreamError> {
        let path = format!("/repos/{}/{}/releases/assets/{}", owner, repo, asset_id);
        let response = self
            .request(&path, "application/octet-stream")
            .send()
            .await
            .inspect_err(|e| {
                tracing::warn!(path = %path, error = %e, "GitHub asset download failed");
                metrics::record_upstream("download_asset", "error");
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            metrics::record_upstream("download_asset", "not_found");
            return Ok(None);
        }
        if !status.is_success() {
            tracing::warn!(path = %path, status = %status, "GitHub asset download returned an error status");
            metrics::record_upstream("download_asset", "error");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.inspect_err(|e| {
            tracing::warn!(path = %path, error = %e, "GitHub asset body read failed");
            metrics::record_upstream("download_asset", "error");
        })?;
        metrics::record_upstream("download_asset", "ok");
        Ok(Some(bytes))
    }
}
