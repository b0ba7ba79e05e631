//! Error types for the gateway

use thiserror::Error;

/// Result type alias using our GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed inbound event, rejected before scoring
    #[error("Invalid event: {0}")]
    Validation(String),

    /// Invalid configuration detected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Delivery to a single advertising platform failed
    #[error("Delivery to {platform} failed: {message}")]
    PlatformDelivery { platform: String, message: String },

    /// The analytics record for an event could not be written
    #[error("Failed to persist event {event_id}: {message}")]
    Persistence { event_id: String, message: String },

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload signing errors
    #[error("Signing error: {0}")]
    Signing(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the analytics append should be attempted again.
    ///
    /// Only a lost analytics record warrants a retry; platform delivery
    /// failures are reconciled out of band. A timed-out append surfaces
    /// here as `Persistence` with message "timeout".
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Persistence { .. })
    }

    pub fn persistence(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Persistence {
            event_id: event_id.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persistence_is_retryable() {
        assert!(GatewayError::persistence("evt_1", "connection reset").is_retryable());
        assert!(!GatewayError::Validation("missing event_name".into()).is_retryable());
        assert!(!GatewayError::PlatformDelivery {
            platform: "meta".into(),
            message: "500".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::persistence("evt_1", "timeout");
        assert_eq!(err.to_string(), "Failed to persist event evt_1: timeout");
    }
}
