//! Generic JSON-over-HTTP platform adapter

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::signing::SignatureHeaders;
use crate::bidding::BidRecommendation;
use crate::common::errors::{GatewayError, Result};
use crate::common::traits::PlatformAdapter;
use crate::common::types::{PlatformId, TrackingEvent};
use crate::config::types::EndpointConfig;
use crate::dispatch::PlatformResult;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Body posted to a platform endpoint
#[derive(Debug, Serialize)]
struct DeliveryEnvelope<'a> {
    event_id: &'a str,
    platform: &'a PlatformId,
    event: &'a TrackingEvent,
    strategy: &'static str,
    multiplier: f64,
    audience_signal: &'a str,
    confidence: f64,
}

/// Adapter that POSTs a JSON envelope to a per-platform collector endpoint
#[derive(Debug, Clone)]
pub struct HttpPlatformAdapter {
    platform: PlatformId,
    client: Client,
    url: String,
    api_key: Option<String>,
    signing_secret: Option<String>,
}

impl HttpPlatformAdapter {
    /// Create an adapter; `timeout` bounds the underlying HTTP client
    pub fn new(platform: PlatformId, endpoint: &EndpointConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(Self {
            platform,
            client,
            url: endpoint.url.clone(),
            api_key: endpoint.api_key.clone(),
            signing_secret: endpoint.signing_secret.clone(),
        })
    }

    fn envelope<'a>(
        &'a self,
        event: &'a TrackingEvent,
        recommendation: &'a BidRecommendation,
    ) -> DeliveryEnvelope<'a> {
        let (multiplier, audience_signal) = match recommendation.for_platform(&self.platform) {
            Some(p) => (p.multiplier, p.audience_signal.as_str()),
            None => (recommendation.multiplier, recommendation.strategy.as_str()),
        };

        DeliveryEnvelope {
            event_id: &event.event_id,
            platform: &self.platform,
            event,
            strategy: recommendation.strategy.as_str(),
            multiplier,
            audience_signal,
            confidence: recommendation.confidence,
        }
    }
}

fn classify_response(status: StatusCode, body: &str) -> PlatformResult {
    let code = status.as_u16();
    if status.is_success() {
        PlatformResult::delivered(Some(code))
    } else if status == StatusCode::CONFLICT {
        // Platform already holds this event_id
        PlatformResult::duplicate(Some(code))
    } else if status.is_client_error() {
        PlatformResult::rejected(code, format!("{}: {}", status, body))
    } else {
        PlatformResult {
            status_code: Some(code),
            ..PlatformResult::failed(format!("{}: {}", status, body))
        }
    }
}

#[async_trait]
impl PlatformAdapter for HttpPlatformAdapter {
    fn platform(&self) -> &PlatformId {
        &self.platform
    }

    #[instrument(skip_all, fields(platform = %self.platform, event_id = %event.event_id))]
    async fn send(
        &self,
        event: &TrackingEvent,
        recommendation: &BidRecommendation,
    ) -> Result<PlatformResult> {
        let body = serde_json::to_string(&self.envelope(event, recommendation))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, &event.event_id);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(secret) = &self.signing_secret {
            request = SignatureHeaders::generate(secret, &event.event_id, &body)?
                .apply_to_request(request);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(PlatformResult::timed_out()),
            Err(e) => return Ok(PlatformResult::failed(e.to_string())),
        };

        let status = response.status();
        let text = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        debug!(status = status.as_u16(), "Platform responded");

        Ok(classify_response(status, &text))
    }
}
