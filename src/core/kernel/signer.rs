use crate::core::errors::ExchangeError;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

pub type HmacSha256 = Hmac<Sha256>;

/// Result type for signing operations: headers to attach to the request
pub type SignatureResult = Result<HashMap<String, String>, ExchangeError>;

/// Signer trait for request authentication
///
/// Implementations are built once from validated credentials, so signing a
/// request never fails because of the key material itself.
pub trait Signer: Send + Sync {
    /// Sign a request and return the authentication headers
    ///
    /// # Arguments
    /// * `method` - Upper-case HTTP method (GET, POST, etc.)
    /// * `request_path` - Endpoint path including `?query` when present
    /// * `body` - Request body text, empty for bodiless requests
    /// * `timestamp` - ISO-8601 UTC timestamp with millisecond precision
    fn sign_request(
        &self,
        method: &str,
        request_path: &str,
        body: &str,
        timestamp: &str,
    ) -> SignatureResult;
}

/// Pre-keyed HMAC-SHA256 that emits base64 signatures
#[derive(Clone)]
pub struct HmacSigningKey {
    mac: HmacSha256,
}

impl HmacSigningKey {
    pub fn new(secret: &[u8]) -> Result<Self, ExchangeError> {
        if secret.is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "HMAC secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| {
            ExchangeError::ConfigurationError(format!("Invalid secret key: {}", e))
        })?;
        Ok(Self { mac })
    }

    /// base64(HMAC-SHA256(secret, message))
    pub fn sign_base64(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacSigningKey([REDACTED])")
    }
}

/// Format an instant as `2020-12-08T09:08:57.715Z`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn now_iso_timestamp() -> String {
    iso_timestamp(Utc::now())
}
