//! Upstream release source.
//!
//! # Design Decisions
//! - Metadata lookups fold transport errors into "absent"/empty
//! - Asset downloads keep "absent" and "failed" apart so the gateway can
//!   answer 404 vs 502

pub mod github;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use github::GitHubClient;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

/// Release metadata as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// A download that failed for reasons other than absence.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Release for `tag` (`latest` for the newest), or `None`.
    async fn get_release(&self, owner: &str, repo: &str, tag: &str) -> Option<Release>;

    /// Up to `limit` releases, newest first. Empty on any failure.
    async fn list_releases(&self, owner: &str, repo: &str, limit: u32) -> Vec<Release>;

    /// Asset bytes, `Ok(None)` when the asset does not exist.
    async fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        asset_id: u64,
    ) -> Result<Option<Bytes>, UpstreamError>;
}
