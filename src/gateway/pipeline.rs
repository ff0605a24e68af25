//! Request lifecycle: validate → authenticate → rate-limit → cache → fetch →
//! store → sign → audit.

use axum::http::{HeaderMap, HeaderName};
use bytes::Bytes;
use chrono::Utc;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::audit::{AuditEvent, AuditSink, AuditStatus};
use crate::auth::{header_name, header_str, AuthSetupError, Authenticator, DeviceIdentity};
use crate::cache::{self, CacheManager};
use crate::config::GatewayConfig;
use crate::gateway::GatewayError;
use crate::security::rate_limit::{anonymous_key, RateLimitDecision, RateLimiter};
use crate::security::sanitize;
use crate::signing::AssetSigner;
use crate::upstream::ReleaseSource;

const UNKNOWN_DEVICE: &str = "unknown";
const MAX_AUDIT_RESOURCE_LEN: usize = 512;

/// Per-request inputs that do not come from the route path.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub headers: &'a HeaderMap,
    /// Socket peer address, used when no forwarded-for header is present.
    pub peer_ip: Option<IpAddr>,
    pub request_id: Option<&'a str>,
}

fn truncate(raw: &str) -> String {
    raw.chars().take(MAX_AUDIT_RESOURCE_LEN).collect()
}

/// A resource as requested, before validation.
#[derive(Debug, Clone, Copy)]
pub enum ResourceRequest<'a> {
    Releases {
        owner: &'a str,
        repo: &'a str,
    },
    Asset {
        owner: &'a str,
        repo: &'a str,
        version: &'a str,
        asset: &'a str,
    },
}

impl ResourceRequest<'_> {
    pub fn action(&self) -> &'static str {
        match self {
            ResourceRequest::Releases { .. } => "list_releases",
            ResourceRequest::Asset { .. } => "download_asset",
        }
    }

    fn raw_path(&self) -> String {
        let path = match self {
            ResourceRequest::Releases { owner, repo } => format!("{}/{}", owner, repo),
            ResourceRequest::Asset {
                owner,
                repo,
                version,
                asset,
            } => format!("{}/{}/{}/{}", owner, repo, version, asset),
        };
        truncate(&path)
    }

    fn validate(&self) -> Result<Resource, GatewayError> {
        match *self {
            ResourceRequest::Releases { owner, repo } => Ok(Resource::Releases {
                owner: sanitize::identifier(owner).ok_or(GatewayError::Validation("owner"))?,
                repo: sanitize::identifier(repo).ok_or(GatewayError::Validation("repo"))?,
            }),
            ResourceRequest::Asset {
                owner,
                repo,
                version,
                asset,
            } => Ok(Resource::Asset {
                owner: sanitize::identifier(owner).ok_or(GatewayError::Validation("owner"))?,
                repo: sanitize::identifier(repo).ok_or(GatewayError::Validation("repo"))?,
                version: sanitize::version(version).ok_or(GatewayError::Validation("version"))?,
                asset: sanitize::asset_name(asset).ok_or(GatewayError::Validation("asset"))?,
            }),
        }
    }
}

/// A validated resource.
#[derive(Debug, Clone)]
enum Resource {
    Releases {
        owner: String,
        repo: String,
    },
    Asset {
        owner: String,
        repo: String,
        version: String,
        asset: String,
    },
}

impl Resource {
    fn path(&self) -> String {
        match self {
            Resource::Releases { owner, repo } => format!("{}/{}", owner, repo),
            Resource::Asset {
                owner,
                repo,
                version,
                asset,
            } => format!("{}/{}/{}/{}", owner, repo, version, asset),
        }
    }

    fn cache_key(&self) -> String {
        match self {
            Resource::Releases { owner, repo } => cache::releases_key(owner, repo),
            Resource::Asset {
                owner,
                repo,
                version,
                asset,
            } => cache::asset_key(owner, repo, version, asset),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            Resource::Releases { .. } => "application/json",
            Resource::Asset { .. } => "application/octet-stream",
        }
    }
}

/// A successful response payload with its integrity metadata.
#[derive(Debug, Clone)]
pub struct Served {
    pub body: Bytes,
    pub content_type: &'static str,
    pub checksum: String,
    pub signature: Option<String>,
    pub cached: bool,
}

/// Terminal result of one request.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Served, GatewayError>,
    /// Present once a rate-limit key has been resolved and consumed.
    pub rate_limit: Option<RateLimitDecision>,
}

/// Who the pipeline believes the caller is.
struct Caller {
    identity: Option<DeviceIdentity>,
    ip: String,
}

impl Caller {
    fn device_id(&self) -> &str {
        self.identity
            .as_ref()
            .map_or(UNKNOWN_DEVICE, |id| id.device_id.as_str())
    }
}

/// The admission pipeline. One instance serves every request.
pub struct Gateway {
    authenticator: Authenticator,
    limiter: RateLimiter,
    cache: CacheManager,
    signer: Option<AssetSigner>,
    source: Arc<dyn ReleaseSource>,
    audit: Arc<dyn AuditSink>,
    forwarded_for: HeaderName,
    release_list_limit: u32,
    request_timeout: Duration,
}

impl Gateway {
    /// Assemble the pipeline from configuration.
    ///
    /// Fails only on authentication setup problems; a bad signing key
    /// disables signing instead.
    pub fn new(
        config: &GatewayConfig,
        source: Arc<dyn ReleaseSource>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AuthSetupError> {
        let authenticator =
            Authenticator::from_config(&config.auth, &config.security.forwarded_for_header)?;
        let forwarded_for = header_name(
            "security.forwarded_for_header",
            &config.security.forwarded_for_header,
        )?;

        Ok(Self {
            authenticator,
            limiter: RateLimiter::new(&config.rate_limit),
            cache: CacheManager::new(&config.cache),
            signer: AssetSigner::load(&config.signing),
            source,
            audit,
            forwarded_for,
            release_list_limit: config.upstream.release_list_limit,
            request_timeout: Duration::from_secs(config.listener.request_timeout_secs),
        })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Drop idle rate-limit state and expired cache entries.
    pub async fn sweep(&self) -> (usize, usize) {
        let keys = self.limiter.sweep();
        let entries = self.cache.sweep().await;
        (keys, entries)
    }

    /// Run one request through the pipeline. Audits exactly once.
    ///
    /// Authentication and serving share one deadline of
    /// `listener.request_timeout_secs`. An expired authentication counts as
    /// no identity; an expired fetch is an upstream failure.
    pub async fn handle(&self, ctx: RequestContext<'_>, request: ResourceRequest<'_>) -> Outcome {
        let deadline = Instant::now() + self.request_timeout;
        let action = request.action();

        let resource = match request.validate() {
            Ok(resource) => resource,
            Err(err) => return self.invalid(&ctx, action, request.raw_path(), err),
        };
        let path = resource.path();

        let identity = timeout_at(deadline, self.authenticator.authenticate(ctx.headers))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(action, resource = %path, "Authentication timed out");
                None
            });
        let client_ip = self.client_ip(&ctx);
        let identity = identity.map(|mut id| {
            // Adapters only see headers; fall back to the resolved client address.
            if id.ip_address.parse::<IpAddr>().is_ok_and(|ip| ip.is_unspecified()) {
                id.ip_address = client_ip.to_string();
            }
            id
        });
        let caller = Caller {
            ip: identity
                .as_ref()
                .map_or_else(|| client_ip.to_string(), |id| id.ip_address.clone()),
            identity,
        };

        let key = match &caller.identity {
            Some(id) => id.device_id.clone(),
            None => anonymous_key(&client_ip),
        };
        let decision = self.limiter.consume(&key);

        if self.authenticator.requires_auth() && caller.identity.is_none() {
            let err = if decision.allowed {
                GatewayError::Unauthorized
            } else {
                GatewayError::RateLimited
            };
            tracing::info!(action, resource = %path, ip = %caller.ip, "Rejected unauthenticated request");
            self.record(&ctx, &caller, action, path, Err(err));
            return Outcome {
                result: Err(err),
                rate_limit: Some(decision),
            };
        }

        if !decision.allowed {
            tracing::info!(action, key = %key, "Rate limit exceeded");
            self.record(&ctx, &caller, action, path, Err(GatewayError::RateLimited));
            return Outcome {
                result: Err(GatewayError::RateLimited),
                rate_limit: Some(decision),
            };
        }

        let result = timeout_at(deadline, self.serve(&resource))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(action, resource = %path, "Request deadline exceeded");
                Err(GatewayError::Upstream)
            });
        self.record(&ctx, &caller, action, path, result.as_ref().map(|s| s.cached).map_err(|e| *e));
        Outcome {
            result,
            rate_limit: Some(decision),
        }
    }

    /// Reject a request whose path parameters could not be decoded.
    ///
    /// Audited like any other validation failure; no rate-limit key is
    /// consumed.
    pub fn reject_malformed(
        &self,
        ctx: RequestContext<'_>,
        action: &'static str,
        raw_path: &str,
    ) -> Outcome {
        let resource = truncate(raw_path);
        self.invalid(&ctx, action, resource, GatewayError::Validation("path"))
    }

    fn invalid(
        &self,
        ctx: &RequestContext<'_>,
        action: &'static str,
        resource: String,
        err: GatewayError,
    ) -> Outcome {
        if let GatewayError::Validation(field) = err {
            tracing::debug!(action, field, "Rejected invalid request");
        }
        let caller = Caller {
            identity: None,
            ip: self.client_ip(ctx).to_string(),
        };
        self.record(ctx, &caller, action, resource, Err(err));
        Outcome {
            result: Err(err),
            rate_limit: None,
        }
    }

    async fn serve(&self, resource: &Resource) -> Result<Served, GatewayError> {
        let key = resource.cache_key();

        if let Some(body) = self.cache.get(&key).await {
            let checksum = match self.cache.checksum(&key).await {
                Some(checksum) => checksum,
                None => cache::sha256_hex(&body),
            };
            return Ok(self.finish(resource, body, checksum, true));
        }

        let body = self.fetch(resource).await?;
        self.cache.set(&key, &body).await;
        let checksum = cache::sha256_hex(&body);
        Ok(self.finish(resource, body, checksum, false))
    }

    async fn fetch(&self, resource: &Resource) -> Result<Bytes, GatewayError> {
        match resource {
            Resource::Releases { owner, repo } => {
                let releases = self
                    .source
                    .list_releases(owner, repo, self.release_list_limit)
                    .await;
                if releases.is_empty() {
                    return Err(GatewayError::NotFound);
                }
                serde_json::to_vec(&releases).map(Bytes::from).map_err(|e| {
                    tracing::error!(error = %e, "Failed to encode release list");
                    GatewayError::Internal
                })
            }
            Resource::Asset {
                owner,
                repo,
                version,
                asset,
            } => {
                let release = self
                    .source
                    .get_release(owner, repo, version)
                    .await
                    .ok_or(GatewayError::NotFound)?;
                let asset_id = release.asset(asset).ok_or(GatewayError::NotFound)?.id;
                match self.source.download_asset(owner, repo, asset_id).await {
                    Ok(Some(bytes)) => Ok(bytes),
                    Ok(None) => Err(GatewayError::NotFound),
                    Err(e) => {
                        tracing::warn!(asset_id, error = %e, "Asset download failed");
                        Err(GatewayError::Upstream)
                    }
                }
            }
        }
    }

    fn finish(&self, resource: &Resource, body: Bytes, checksum: String, cached: bool) -> Served {
        let signature = self.signer.as_ref().and_then(|signer| {
            signer
                .sign(&body)
                .inspect_err(|e| tracing::warn!(error = %e, "Signing failed, serving unsigned"))
                .ok()
        });
        Served {
            content_type: resource.content_type(),
            body,
            checksum,
            signature,
            cached,
        }
    }

    /// Forwarded-for header first, then the socket peer.
    fn client_ip(&self, ctx: &RequestContext<'_>) -> IpAddr {
        match header_str(ctx.headers, &self.forwarded_for) {
            Some(raw) => sanitize::client_ip(Some(raw)),
            None => ctx.peer_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        }
    }

    fn record(
        &self,
        ctx: &RequestContext<'_>,
        caller: &Caller,
        action: &'static str,
        resource: String,
        result: Result<bool, GatewayError>,
    ) {
        let (status, details) = match result {
            Ok(cached) => (AuditStatus::Success, serde_json::json!({ "cached": cached })),
            Err(err) => (
                AuditStatus::Failure,
                serde_json::json!({ "reason": err.reason_code() }),
            ),
        };
        self.audit.record(AuditEvent {
            timestamp: Utc::now(),
            request_id: ctx.request_id.map(str::to_string),
            device_id: caller.device_id().to_string(),
            auth_method: caller
                .identity
                .as_ref()
                .map(|id| id.auth_method.as_str().to_string()),
            ip_address: caller.ip.clone(),
            action: action.to_string(),
            resource,
            status,
            details: Some(details),
        });
    }
}
