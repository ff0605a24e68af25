//! Detached RSA-SHA256 signatures over served bytes.
//!
//! PKCS#1 v1.5 padding is deterministic, so a given key always produces the
//! same signature for the same bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;
use thiserror::Error;

use crate::config::SigningConfig;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no RSA private key found in PEM")]
    NoKey,

    #[error("invalid RSA key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Signs response payloads with the configured private key.
pub struct AssetSigner {
    key: SigningKey<Sha256>,
}

impl AssetSigner {
    /// Load the signer named by config.
    ///
    /// Returns `None` when signing is not configured or the key cannot be
    /// loaded; the failure is logged and the gateway runs unsigned.
    pub fn load(config: &SigningConfig) -> Option<Self> {
        let path = config.private_key_path.as_deref()?;
        match Self::from_file(path) {
            Ok(signer) => {
                tracing::info!(key = %path.display(), "Asset signing enabled");
                Some(signer)
            }
            Err(e) => {
                tracing::error!(key = %path.display(), error = %e, "Failed to load signing key, signing disabled");
                None
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SignerError> {
        let pem = std::fs::read(path)?;
        Self::from_pem(&pem)
    }

    /// Parse a PKCS#1 or PKCS#8 PEM private key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, SignerError> {
        let mut reader = pem;
        loop {
            let key = match rustls_pemfile::read_one(&mut reader)? {
                None => return Err(SignerError::NoKey),
                Some(rustls_pemfile::Item::Pkcs1Key(key)) => {
                    RsaPrivateKey::from_pkcs1_der(key.secret_pkcs1_der())
                        .map_err(|e| SignerError::InvalidKey(e.to_string()))?
                }
                Some(rustls_pemfile::Item::Pkcs8Key(key)) => {
                    RsaPrivateKey::from_pkcs8_der(key.secret_pkcs8_der())
                        .map_err(|e| SignerError::InvalidKey(e.to_string()))?
                }
                Some(_) => continue,
            };
            return Ok(Self {
                key: SigningKey::<Sha256>::new(key),
            });
        }
    }

    /// Base64 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Result<String, SignerError> {
        let signature = self
            .key
            .try_sign(data)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }
}

/// Parse an SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM public key.
pub fn load_public_key(pem: &str) -> Result<RsaPublicKey, SignerError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SignerError::InvalidKey(e.to_string()))
}

/// Check a base64 signature over `data`. Any failure is `false`.
pub fn verify_signature(public_key: &RsaPublicKey, data: &[u8], signature_b64: &str) -> bool {
    let Ok(raw) = STANDARD.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(data, &signature)
        .is_ok()
}

/// Same as [`verify_signature`], taking the public key as PEM.
pub fn verify_with_pem(public_key_pem: &str, data: &[u8], signature_b64: &str) -> bool {
    match load_public_key(public_key_pem) {
        Ok(key) => verify_signature(&key, data, signature_b64),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = include_str!("../tests/fixtures/signing_key.pem");
    const KEY_PKCS1: &str = include_str!("../tests/fixtures/signing_key_pkcs1.pem");
    const PUB: &str = include_str!("../tests/fixtures/signing_pub.pem");
    const OTHER_PUB: &str = include_str!("../tests/fixtures/other_pub.pem");
    const HELLO_SIG: &str = include_str!("../tests/fixtures/hello_gitgate.sig");

    #[test]
    fn test_sign_is_deterministic() {
        let signer = AssetSigner::from_pem(KEY.as_bytes()).unwrap();
        let a = signer.sign(b"hello gitgate").unwrap();
        let b = signer.sign(b"hello gitgate").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, HELLO_SIG.trim());
    }

    #[test]
    fn test_pkcs1_and_pkcs8_agree() {
        let a = AssetSigner::from_pem(KEY.as_bytes()).unwrap();
        let b = AssetSigner::from_pem(KEY_PKCS1.as_bytes()).unwrap();
        assert_eq!(a.sign(b"x").unwrap(), b.sign(b"x").unwrap());
    }

    #[test]
    fn test_verify_round() {
        let signer = AssetSigner::from_pem(KEY.as_bytes()).unwrap();
        let sig = signer.sign(b"asset bytes").unwrap();
        assert!(verify_with_pem(PUB, b"asset bytes", &sig));
        assert!(!verify_with_pem(PUB, b"other bytes", &sig));
        assert!(!verify_with_pem(OTHER_PUB, b"asset bytes", &sig));
    }

    #[test]
    fn test_verify_never_errors() {
        assert!(!verify_with_pem(PUB, b"x", "!!not base64!!"));
        assert!(!verify_with_pem(PUB, b"x", "AAAA"));
        assert!(!verify_with_pem("garbage", b"x", HELLO_SIG.trim()));
    }

    #[test]
    fn test_bad_keys() {
        assert!(matches!(AssetSigner::from_pem(b""), Err(SignerError::NoKey)));
        assert!(matches!(AssetSigner::from_pem(PUB.as_bytes()), Err(SignerError::NoKey)));
    }

    #[test]
    fn test_load_missing_file_disables_signing() {
        let config = SigningConfig {
            private_key_path: Some("/nonexistent/key.pem".into()),
        };
        assert!(AssetSigner::load(&config).is_none());
        assert!(AssetSigner::load(&SigningConfig::default()).is_none());
    }
}
