//! Checksum-verified, TTL-bounded on-disk cache.
//!
//! # Layout
//! ```text
//! <dir>/<sha256(cache key)>.bin   payload bytes
//! <dir>/<sha256(cache key)>.json  {checksum, stored_at_ms, ttl_secs, size}
//! ```
//!
//! # Design Decisions
//! - Storage names are hashes, so no user input reaches a filesystem path
//! - Writes go through a temp file and `rename`; last writer wins
//! - Every I/O failure degrades to a miss; the cache never fails a request
//! - Expired entries are ignored on read and removed only by `sweep`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::security::rate_limit::now_ms;
use crate::security::sanitize;

/// Hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Cache key for a repository's release list.
pub fn releases_key(owner: &str, repo: &str) -> String {
    format!("releases:{}:{}", owner, repo)
}

/// Cache key for a single release asset.
pub fn asset_key(owner: &str, repo: &str, version: &str, asset: &str) -> String {
    format!("asset:{}:{}:{}:{}", owner, repo, version, asset)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    checksum: String,
    stored_at_ms: u64,
    ttl_secs: u64,
    size: u64,
}

impl EntryMeta {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.stored_at_ms) > self.ttl_secs.saturating_mul(1000)
    }
}

/// File-backed cache shared by all request tasks.
#[derive(Debug, Clone)]
pub struct CacheManager {
    directory: Option<PathBuf>,
    ttl_secs: u64,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        tracing::info!(
            directory = %config.directory.display(),
            ttl_secs = config.ttl_secs,
            "Cache enabled"
        );
        Self {
            directory: Some(config.directory.clone()),
            ttl_secs: config.ttl_secs,
        }
    }

    /// A cache that stores nothing and always misses.
    pub fn disabled() -> Self {
        Self {
            directory: None,
            ttl_secs: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.directory.is_some()
    }

    fn paths(&self, key: &str) -> Option<(PathBuf, PathBuf)> {
        let dir = self.directory.as_deref()?;
        let name = sha256_hex(key.as_bytes());
        let payload = sanitize::resolve_safe_path(dir, &format!("{}.bin", name))?;
        let meta = sanitize::resolve_safe_path(dir, &format!("{}.json", name))?;
        Some((payload, meta))
    }

    async fn read_meta(path: &Path) -> Option<EntryMeta> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache metadata read failed");
                metrics::record_cache("error");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache metadata corrupt");
                metrics::record_cache("error");
                None
            }
        }
    }

    /// Fetch a live entry's bytes.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.get_at(key, now_ms()).await
    }

    pub async fn get_at(&self, key: &str, now: u64) -> Option<Bytes> {
        let (payload_path, meta_path) = self.paths(key)?;
        let Some(meta) = Self::read_meta(&meta_path).await.filter(|m| !m.is_expired(now)) else {
            metrics::record_cache("miss");
            return None;
        };

        let payload = match fs::read(&payload_path).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache payload read failed");
                metrics::record_cache("error");
                return None;
            }
        };

        if sha256_hex(&payload) != meta.checksum {
            tracing::warn!(key = %key, "Cache payload checksum mismatch, ignoring entry");
            metrics::record_cache("error");
            return None;
        }

        metrics::record_cache("hit");
        Some(Bytes::from(payload))
    }

    /// Stored checksum of a live entry.
    pub async fn checksum(&self, key: &str) -> Option<String> {
        self.checksum_at(key, now_ms()).await
    }

    pub async fn checksum_at(&self, key: &str, now: u64) -> Option<String> {
        let (_, meta_path) = self.paths(key)?;
        Self::read_meta(&meta_path)
            .await
            .filter(|m| !m.is_expired(now))
            .map(|m| m.checksum)
    }

    /// Store `payload` under `key`, replacing any previous entry.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn set(&self, key: &str, payload: &[u8]) {
        self.set_at(key, payload, now_ms()).await
    }

    pub async fn set_at(&self, key: &str, payload: &[u8], now: u64) {
        let Some((payload_path, meta_path)) = self.paths(key) else {
            return;
        };
        let meta = EntryMeta {
            checksum: sha256_hex(payload),
            stored_at_ms: now,
            ttl_secs: self.ttl_secs,
            size: payload.len() as u64,
        };

        let result = async {
            if let Some(dir) = &self.directory {
                fs::create_dir_all(dir).await?;
            }
            write_atomic(&payload_path, payload).await?;
            let meta_json = serde_json::to_vec(&meta).map_err(std::io::Error::other)?;
            write_atomic(&meta_path, &meta_json).await
        }
        .await;

        match result {
            Ok(()) => {
                metrics::record_cache("store");
                tracing::debug!(key = %key, size = meta.size, "Cached entry");
            }
            Err(e) => {
                metrics::record_cache("error");
                tracing::warn!(key = %key, error = %e, "Cache write failed");
            }
        }
    }

    /// Delete expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(now_ms()).await
    }

    pub async fn sweep_at(&self, now: u64) -> usize {
        let Some(dir) = self.directory.as_deref() else {
            return 0;
        };
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(error = %e, "Cache sweep could not list directory");
                }
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let meta_path = entry.path();
            if meta_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let expired = match Self::read_meta(&meta_path).await {
                Some(meta) => meta.is_expired(now),
                None => true,
            };
            if expired {
                let _ = fs::remove_file(meta_path.with_extension("bin")).await;
                if fs::remove_file(&meta_path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Swept expired cache entries");
        }
        removed
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    if let Err(e) = fs::write(&tmp, data).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path, ttl_secs: u64) -> CacheManager {
        CacheManager::new(&CacheConfig {
            enabled: true,
            directory: dir.to_path_buf(),
            ttl_secs,
        })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        let key = asset_key("acme", "tool", "v1.0.0", "tool.tar.gz");

        assert!(cache.get(&key).await.is_none());
        cache.set(&key, b"payload").await;
        assert_eq!(cache.get(&key).await.unwrap().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_checksum_matches_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        cache.set("k", b"some bytes").await;
        let bytes = cache.get("k").await.unwrap();
        assert_eq!(cache.checksum("k").await.unwrap(), sha256_hex(&bytes));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_but_file_remains() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 10);
        cache.set_at("k", b"old", 1_000).await;

        assert!(cache.get_at("k", 11_000).await.is_some());
        assert!(cache.get_at("k", 11_001).await.is_none());
        assert!(cache.checksum_at("k", 11_001).await.is_none());

        let (payload_path, _) = cache.paths("k").unwrap();
        assert!(payload_path.exists());
    }

    #[tokio::test]
    async fn test_storage_names_hide_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        cache.set("asset:../../etc:passwd", b"x").await;
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        for name in names {
            assert!(!name.contains("etc"));
            assert_eq!(name.split('.').next().unwrap().len(), 64);
        }
    }

    #[tokio::test]
    async fn test_corrupted_payload_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        cache.set("k", b"original").await;
        let (payload_path, _) = cache.paths("k").unwrap();
        std::fs::write(&payload_path, b"tampered").unwrap();
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        cache.set("k", b"data").await;
        let (_, meta_path) = cache.paths("k").unwrap();
        std::fs::write(&meta_path, b"{not json").unwrap();
        assert!(cache.get("k").await.is_none());
        assert!(cache.checksum("k").await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 60);
        cache.set("k", b"one").await;
        cache.set("k", b"two").await;
        assert_eq!(cache.get("k").await.unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_write_failure_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let cache = cache(&blocker, 60);
        cache.set("k", b"data").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 10);
        cache.set_at("old", b"1", 0).await;
        cache.set_at("new", b"2", 20_000).await;
        assert_eq!(cache.sweep_at(20_001).await, 1);
        assert!(cache.get_at("new", 20_001).await.is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let cache = CacheManager::disabled();
        cache.set("k", b"x").await;
        assert!(!cache.is_enabled());
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.sweep().await, 0);
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(releases_key("acme", "tool"), "releases:acme:tool");
        assert_eq!(asset_key("acme", "tool", "v1", "a.zip"), "asset:acme:tool:v1:a.zip");
    }
}
