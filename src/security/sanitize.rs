//! Input validation and normalization.
//!
//! # Responsibilities
//! - Validate path parameters (owner, repo, version, asset name)
//! - Validate credential-carrying header values
//! - Derive a client IP from a forwarded-for style header
//! - Resolve paths under a base directory without escaping it
//! - Validate outbound HTTPS URLs
//!
//! # Design Decisions
//! - Every validator returns `Option`: `None` is a rejection, never a panic
//! - Validators are pure, so config loading and request handling share them
//! - Charsets are allow-lists; anything not listed is rejected

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Maximum length of an owner or repository name.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Maximum length of a version/tag or asset file name.
pub const MAX_VERSION_LEN: usize = 200;

/// Maximum length of an asset file name.
pub const MAX_ASSET_NAME_LEN: usize = 200;

/// Maximum length of any header value.
pub const MAX_HEADER_LEN: usize = 2048;

/// Maximum length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Maximum length of a user identifier.
pub const MAX_USER_ID_LEN: usize = 256;

/// Maximum length of a URL-encoded client certificate header.
pub const MAX_CERT_HEADER_LEN: usize = 16 * 1024;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?(?:\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?$",
    )
    .expect("semver pattern is valid")
});

fn within(input: &str, max: usize) -> bool {
    !input.is_empty() && input.len() <= max
}

fn all_chars(input: &str, allowed: impl Fn(char) -> bool) -> bool {
    input.chars().all(allowed)
}

/// Validate a repository owner or repository name.
///
/// Returns the trimmed value when it is 1..=100 characters of `[A-Za-z0-9_-]`.
pub fn identifier(input: &str) -> Option<String> {
    let value = input.trim();
    if !within(value, MAX_IDENTIFIER_LEN) {
        return None;
    }
    all_chars(value, |c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        .then(|| value.to_string())
}

/// Validate a release version or tag.
///
/// Accepts a semantic version (optionally `v`-prefixed) or a generic tag made
/// of `[A-Za-z0-9._-]`. `..` is never accepted.
pub fn version(input: &str) -> Option<String> {
    let value = input.trim();
    if !within(value, MAX_VERSION_LEN) || value.contains("..") {
        return None;
    }
    let generic = all_chars(value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
    });
    (generic || SEMVER.is_match(value)).then(|| value.to_string())
}

/// Validate a release asset file name.
pub fn asset_name(input: &str) -> Option<String> {
    let value = input.trim();
    if !within(value, MAX_ASSET_NAME_LEN) {
        return None;
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") || value == "." {
        return None;
    }
    all_chars(value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+')
    })
    .then(|| value.to_string())
}

/// Validate a raw header value: bounded length, no CR, LF or NUL.
pub fn header_value(input: &str, max: usize) -> Option<&str> {
    if input.contains(['\r', '\n', '\0']) {
        return None;
    }
    let value = input.trim();
    within(value, max).then_some(value)
}

/// Validate a bearer-style device token.
///
/// An optional `Bearer ` prefix is stripped.
pub fn token(input: &str) -> Option<String> {
    let value = header_value(input, MAX_HEADER_LEN)?;
    let value = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    if value.is_empty() {
        return None;
    }
    all_chars(value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '~' | '+' | '/' | '=')
    })
    .then(|| value.to_string())
}

/// Validate a user identifier (login name or e-mail style).
pub fn user_id(input: &str) -> Option<String> {
    let value = header_value(input, MAX_USER_ID_LEN)?;
    all_chars(value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '+')
    })
    .then(|| value.to_string())
}

/// Validate a device identifier.
pub fn device_id(input: &str) -> Option<String> {
    let value = header_value(input, MAX_DEVICE_ID_LEN)?;
    all_chars(value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '@')
    })
    .then(|| value.to_string())
}

/// Parse a single IP, allowing `[v6]`, `[v6]:port` and `v4:port` forms.
pub fn parse_ip(input: &str) -> Option<IpAddr> {
    let value = input.trim();
    if let Some(rest) = value.strip_prefix('[') {
        let (inner, _) = rest.split_once(']')?;
        return inner.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => host.parse::<Ipv4Addr>().ok().map(IpAddr::V4),
        _ => None,
    }
}

/// Derive the client IP from a forwarded-for style header.
///
/// Takes the first comma-separated entry. Anything that does not parse as an
/// IP yields `0.0.0.0`.
pub fn client_ip(forwarded_for: Option<&str>) -> IpAddr {
    forwarded_for
        .and_then(|raw| header_value(raw, MAX_HEADER_LEN))
        .and_then(|raw| raw.split(',').next())
        .and_then(parse_ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `input` against `base`, rejecting anything that escapes `base`.
///
/// The check is lexical; the filesystem is not consulted.
pub fn resolve_safe_path(base: &Path, input: &str) -> Option<PathBuf> {
    if input.contains('\0') {
        return None;
    }
    let candidate = Path::new(input);
    if candidate.is_absolute() || candidate.has_root() {
        return None;
    }
    let base = normalize(base);
    let resolved = normalize(&base.join(candidate));
    let relative = resolved.strip_prefix(&base).ok()?;
    if matches!(relative.components().next(), Some(Component::ParentDir)) {
        return None;
    }
    Some(resolved)
}

/// Validate an outbound URL: `https` only, no embedded credentials.
pub fn https_url(input: &str) -> Option<Url> {
    let url = Url::parse(input.trim()).ok()?;
    if url.scheme() != "https" || url.host_str().is_none() {
        return None;
    }
    if !url.username().is_empty() || url.password().is_some() {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_and_trims() {
        assert_eq!(identifier("  acme ").as_deref(), Some("acme"));
        assert_eq!(identifier("my_tool-2").as_deref(), Some("my_tool-2"));
    }

    #[test]
    fn test_identifier_rejects_bad_input() {
        for bad in ["", "a/b", "a\\b", "..", "a..b", "a.b", "owner name", "ä"] {
            assert!(identifier(bad).is_none(), "{bad:?} should be rejected");
        }
        assert!(identifier(&"a".repeat(100)).is_some());
        assert!(identifier(&"a".repeat(101)).is_none());
    }

    #[test]
    fn test_version_patterns() {
        assert_eq!(version("v1.2.3").as_deref(), Some("v1.2.3"));
        assert_eq!(version("1.0.0-rc.1+build.5").as_deref(), Some("1.0.0-rc.1+build.5"));
        assert_eq!(version("nightly_2024-01-01").as_deref(), Some("nightly_2024-01-01"));
        assert!(version("1.0+weird+").is_none());
        assert!(version("../etc").is_none());
        assert!(version("v1/2").is_none());
        assert!(version(&"1".repeat(201)).is_none());
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(asset_name("tool-linux-x86_64.tar.gz").as_deref(), Some("tool-linux-x86_64.tar.gz"));
        assert!(asset_name("../secret").is_none());
        assert!(asset_name("dir/file").is_none());
        assert!(asset_name("dir\\file").is_none());
        assert!(asset_name(".").is_none());
        assert!(asset_name("file name.zip").is_none());
    }

    #[test]
    fn test_header_injection_rejected() {
        assert!(header_value("abc\r\nX-Evil: 1", MAX_HEADER_LEN).is_none());
        assert!(header_value("abc\0", MAX_HEADER_LEN).is_none());
        assert!(header_value("   ", MAX_HEADER_LEN).is_none());
        assert_eq!(header_value(" ok ", MAX_HEADER_LEN), Some("ok"));
        assert!(header_value(&"x".repeat(2049), MAX_HEADER_LEN).is_none());
    }

    #[test]
    fn test_credential_headers() {
        assert_eq!(token("Bearer abc.def-ghi").as_deref(), Some("abc.def-ghi"));
        assert!(token("abc def").is_none());
        assert_eq!(user_id("alice@example.com").as_deref(), Some("alice@example.com"));
        assert!(user_id("alice;drop").is_none());
        assert_eq!(device_id("nABC123:tag").as_deref(), Some("nABC123:tag"));
        assert!(device_id("dev ice").is_none());
        assert!(device_id(&"d".repeat(129)).is_none());
    }

    #[test]
    fn test_client_ip() {
        assert_eq!(client_ip(Some("203.0.113.7, 10.0.0.1")).to_string(), "203.0.113.7");
        assert_eq!(client_ip(Some("203.0.113.7:4711")).to_string(), "203.0.113.7");
        assert_eq!(client_ip(Some("[2001:db8::1]:443")).to_string(), "2001:db8::1");
        assert_eq!(client_ip(Some("2001:db8::2")).to_string(), "2001:db8::2");
        assert_eq!(client_ip(Some("not-an-ip")).to_string(), "0.0.0.0");
        assert_eq!(client_ip(None).to_string(), "0.0.0.0");
    }

    #[test]
    fn test_resolve_safe_path() {
        let base = Path::new("/var/cache/gitgate");
        assert!(resolve_safe_path(base, "../../etc/passwd").is_none());
        assert!(resolve_safe_path(base, "/etc/passwd").is_none());
        assert!(resolve_safe_path(base, "a\0b").is_none());
        assert!(resolve_safe_path(base, "sub/../../x").is_none());

        let resolved = resolve_safe_path(base, "sub/dir/file").unwrap();
        assert!(resolved.starts_with(base));
        assert_eq!(resolved, Path::new("/var/cache/gitgate/sub/dir/file"));
        assert_eq!(
            resolve_safe_path(base, "sub/./x/../file").unwrap(),
            Path::new("/var/cache/gitgate/sub/file")
        );
    }

    #[test]
    fn test_https_url() {
        assert!(https_url("https://api.example.com/v1/devices").is_some());
        assert!(https_url("http://api.example.com").is_none());
        assert!(https_url("https://user:pw@api.example.com").is_none());
        assert!(https_url("https://token@api.example.com").is_none());
        assert!(https_url("ftp://example.com").is_none());
        assert!(https_url("not a url").is_none());
    }
}
