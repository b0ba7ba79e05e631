//! Payload signing for platform deliveries

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Gateway-Timestamp";

/// Generate an HMAC-SHA256 signature over a delivery payload
///
/// # Arguments
/// * `secret` - Signing secret (base64 encoded)
/// * `timestamp` - Unix timestamp in seconds
/// * `event_id` - Idempotency key of the delivered event
/// * `body` - Exact request body
pub fn sign_payload(secret: &str, timestamp: i64, event_id: &str, body: &str) -> Result<String> {
    let secret_bytes = BASE64
        .decode(secret)
        .map_err(|e| GatewayError::Signing(format!("Failed to decode secret: {}", e)))?;

    let message = format!("{}{}{}", timestamp, event_id, body);

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| GatewayError::Signing(format!("Failed to create HMAC: {}", e)))?;
    mac.update(message.as_bytes());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Signature headers for one delivery
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub signature: String,
    pub timestamp: i64,
}

impl SignatureHeaders {
    pub fn generate(secret: &str, event_id: &str, body: &str) -> Result<Self> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_payload(secret, timestamp, event_id, body)?;
        Ok(Self {
            signature,
            timestamp,
        })
    }

    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(SIGNATURE_HEADER, &self.signature)
            .header(TIMESTAMP_HEADER, self.timestamp.to_string())
    }
}
