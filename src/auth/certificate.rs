//! Client certificate verification against a configured CA.
//!
//! # Checks (in order)
//! 1. Validity window contains the current time
//! 2. Signature verifies with the CA public key
//! 3. Key usage, when present, allows digital signatures
//!
//! The device id is the first subject-alternative-name entry, or the subject
//! common name when the certificate has no SAN.

use axum::http::{HeaderMap, HeaderName};
use std::fs;
use x509_parser::prelude::*;

use crate::auth::{header_name, header_str, AuthSetupError, DeviceIdentity, UNKNOWN_IP};
use crate::config::{AuthMethod, CertificateAuthConfig};
use crate::security::sanitize;

/// Extract the DER bytes of the first certificate in a PEM document.
pub fn first_certificate_der(pem: &[u8]) -> Option<Vec<u8>> {
    let mut reader = pem;
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .and_then(Result::ok)
        .map(|der| der.as_ref().to_vec());
    der
}

/// Split a distinguished name string into `(attribute, value)` pairs.
///
/// Unescaped `,` and `/` separate segments; `\` escapes the next character.
/// Segments without an unescaped `=` are skipped.
pub fn parse_distinguished_name(dn: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = dn.chars();

    let mut flush = |key: &mut String, value: &mut String, in_value: &mut bool| {
        if *in_value && !key.trim().is_empty() {
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }
        key.clear();
        value.clear();
        *in_value = false;
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if in_value { value.push(escaped) } else { key.push(escaped) }
                }
            }
            ',' | '/' => flush(&mut key, &mut value, &mut in_value),
            '=' if !in_value => in_value = true,
            _ => {
                if in_value { value.push(c) } else { key.push(c) }
            }
        }
    }
    flush(&mut key, &mut value, &mut in_value);
    pairs
}

/// Common name from a distinguished name string.
pub fn common_name(dn: &str) -> Option<String> {
    parse_distinguished_name(dn)
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("CN"))
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

pub struct CertificateAdapter {
    ca_der: Vec<u8>,
    header: HeaderName,
}

impl CertificateAdapter {
    pub fn new(config: &CertificateAuthConfig) -> Result<Self, AuthSetupError> {
        let path = config
            .ca_cert_path
            .as_ref()
            .ok_or(AuthSetupError::MissingSetting("auth.certificate.ca_cert_path"))?;
        let pem = fs::read(path)
            .map_err(|e| AuthSetupError::CaCertificate(format!("{}: {}", path.display(), e)))?;
        let adapter = Self::from_ca_pem(&pem, header_name("auth.certificate.header", &config.header)?)?;
        tracing::info!(ca = %path.display(), "Loaded device CA certificate");
        Ok(adapter)
    }

    pub fn from_ca_pem(pem: &[u8], header: HeaderName) -> Result<Self, AuthSetupError> {
        let ca_der = first_certificate_der(pem)
            .ok_or_else(|| AuthSetupError::CaCertificate("no certificate in PEM".to_string()))?;
        X509Certificate::from_der(&ca_der)
            .map_err(|e| AuthSetupError::CaCertificate(e.to_string()))?;
        Ok(Self { ca_der, header })
    }

    /// Verify the URL-encoded PEM certificate carried in the configured header.
    pub fn verify(&self, headers: &HeaderMap) -> Option<DeviceIdentity> {
        let Some(raw) = header_str(headers, &self.header) else {
            tracing::debug!(header = %self.header, "No client certificate presented");
            return None;
        };
        let Some(raw) = sanitize::header_value(raw, sanitize::MAX_CERT_HEADER_LEN) else {
            tracing::warn!("Rejected malformed client certificate header");
            return None;
        };
        let pem = match urlencoding::decode(raw) {
            Ok(pem) => pem,
            Err(e) => {
                tracing::warn!(error = %e, "Client certificate is not valid URL encoding");
                return None;
            }
        };
        self.verify_pem(pem.as_bytes())
    }

    /// Verify a PEM-encoded client certificate.
    pub fn verify_pem(&self, pem: &[u8]) -> Option<DeviceIdentity> {
        let Some(der) = first_certificate_der(pem) else {
            tracing::warn!("Client certificate PEM could not be decoded");
            return None;
        };
        let cert = match X509Certificate::from_der(&der) {
            Ok((_, cert)) => cert,
            Err(e) => {
                tracing::warn!(error = %e, "Client certificate could not be parsed");
                return None;
            }
        };
        let ca = match X509Certificate::from_der(&self.ca_der) {
            Ok((_, ca)) => ca,
            Err(e) => {
                tracing::warn!(error = %e, "CA certificate could not be parsed");
                return None;
            }
        };

        if !cert.validity().is_valid_at(ASN1Time::now()) {
            tracing::warn!(subject = %cert.subject(), "Client certificate outside validity window");
            return None;
        }

        if let Err(e) = cert.verify_signature(Some(ca.public_key())) {
            tracing::warn!(subject = %cert.subject(), error = %e, "Client certificate not signed by CA");
            return None;
        }

        match cert.key_usage() {
            Ok(Some(ku)) if !ku.value.digital_signature() => {
                tracing::warn!(subject = %cert.subject(), "Client certificate key usage lacks digitalSignature");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Client certificate key usage could not be read");
                return None;
            }
        }

        let cn = common_name(&cert.subject().to_string());
        let candidate = match first_san(&cert) {
            Ok(Some(san)) => san,
            Ok(None) => match cn.clone() {
                Some(cn) => cn,
                None => {
                    tracing::warn!("Client certificate has neither SAN nor CN");
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Client certificate SAN could not be read");
                return None;
            }
        };

        let Some(device_id) = sanitize::device_id(&candidate) else {
            tracing::warn!("Client certificate device id failed validation");
            return None;
        };

        let mut identity = DeviceIdentity::new(device_id, AuthMethod::Certificate, UNKNOWN_IP.to_string());
        identity.device_name = cn;
        Some(identity)
    }
}

fn first_san(cert: &X509Certificate<'_>) -> Result<Option<String>, X509Error> {
    let Some(san) = cert.subject_alternative_name()? else {
        return Ok(None);
    };
    Ok(san.value.general_names.iter().find_map(|name| match name {
        GeneralName::DNSName(v) | GeneralName::RFC822Name(v) | GeneralName::URI(v) => {
            Some(v.to_string())
        }
        _ => None,
    }))
}
