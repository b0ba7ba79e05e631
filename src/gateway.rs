//! End-to-end event pipeline
//!
//! validate → rate-limit → score → predictions → decide → dispatch

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::bidding::{BidDecisionEngine, BidRecommendation, PredictionSignals};
use crate::common::errors::{GatewayError, Result};
use crate::common::retry::RetryPolicy;
use crate::common::traits::{
    SharedAnalyticsSink, SharedPlatformAdapter, SharedPredictionSource, SharedRateLimitStore,
};
use crate::common::types::{InboundEvent, TrackingEvent};
use crate::config::types::{AppConfig, RateLimitConfig};
use crate::dispatch::{DispatchOrchestrator, DispatchOutcome, EventStage};
use crate::trust::{TrustAssessment, TrustScorer};

/// What the gateway reports for one processed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub event_id: String,
    pub assessment: TrustAssessment,
    /// Absent for blocked events
    pub recommendation: Option<BidRecommendation>,
    pub outcome: DispatchOutcome,
}

struct RateLimiter {
    store: SharedRateLimitStore,
    config: RateLimitConfig,
}

/// Composes scoring, decisioning and dispatch over shared collaborators
///
/// Holds no per-event state; one instance serves any number of concurrent
/// events.
pub struct Gateway {
    scorer: TrustScorer,
    engine: BidDecisionEngine,
    orchestrator: DispatchOrchestrator,
    predictions: Option<SharedPredictionSource>,
    rate_limiter: Option<RateLimiter>,
    rate_limit_config: RateLimitConfig,
}

impl Gateway {
    pub fn new(
        config: &AppConfig,
        adapters: Vec<SharedPlatformAdapter>,
        sink: SharedAnalyticsSink,
    ) -> Self {
        let orchestrator = DispatchOrchestrator::from_config(adapters, sink, config);
        let engine = BidDecisionEngine::new(config.bid.clone())
            .with_platforms(orchestrator.platforms());

        Self {
            scorer: TrustScorer::new(&config.trust),
            engine,
            orchestrator,
            predictions: None,
            rate_limiter: None,
            rate_limit_config: config.rate_limit.clone(),
        }
    }

    pub fn with_prediction_source(mut self, source: SharedPredictionSource) -> Self {
        self.predictions = Some(source);
        self
    }

    /// Attach a rate-limit counter; ignored unless `rate_limit.enabled`
    pub fn with_rate_limit_store(mut self, store: SharedRateLimitStore) -> Self {
        if self.rate_limit_config.enabled {
            self.rate_limiter = Some(RateLimiter {
                store,
                config: self.rate_limit_config.clone(),
            });
        }
        self
    }

    /// Validate and process one inbound event
    ///
    /// Returns `Err(Validation)` for malformed input and `Err(Persistence)`
    /// when the analytics record could not be written; the latter should be
    /// retried.
    pub async fn process(&self, inbound: InboundEvent) -> Result<GatewayResponse> {
        let event = Arc::new(TrackingEvent::from_inbound(inbound, Utc::now())?);
        self.process_event(event, &RetryPolicy::none()).await
    }

    /// Like [`Gateway::process`], retrying the analytics append with backoff
    ///
    /// The event is rate-limited, scored, priced and sent to the platforms
    /// once; only the append is repeated.
    pub async fn process_with_retry(
        &self,
        inbound: InboundEvent,
        policy: &RetryPolicy,
    ) -> Result<GatewayResponse> {
        let event = Arc::new(TrackingEvent::from_inbound(inbound, Utc::now())?);
        self.process_event(event, policy).await
    }

    /// Purge closed rate-limit windows once per window
    ///
    /// Returns `None` when rate limiting is disabled.
    pub fn spawn_rate_limit_sweeper(&self) -> Option<JoinHandle<()>> {
        let limiter = self.rate_limiter.as_ref()?;
        let store = Arc::clone(&limiter.store);
        let every = limiter.config.window().max(Duration::from_secs(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged expired rate-limit counters"),
                    Err(e) => warn!(error = %e, "Failed to purge rate-limit counters"),
                }
            }
        }))
    }

    /// Wait for background delivery updates to reach the analytics sink
    pub async fn settle_deliveries(&self) {
        self.orchestrator.settle_deliveries().await;
    }

    #[instrument(skip_all, fields(event_id = %event.event_id))]
    pub async fn process_event(
        &self,
        event: Arc<TrackingEvent>,
        policy: &RetryPolicy,
    ) -> Result<GatewayResponse> {
        debug!(
            stage = %EventStage::Received,
            event_name = %event.event_name.as_str(),
            conversion = event.event_name.is_conversion(),
            "Event received"
        );

        let rate_limited = self.check_rate_limit(&event).await;
        let assessment = self.scorer.score(&event.request_context(rate_limited));
        debug!(from = %EventStage::Received, to = %EventStage::Scored, "Event stage transition");
        info!(
            score = assessment.score,
            action = %assessment.action,
            rate_limited,
            "Trust decision"
        );

        let recommendation = if assessment.is_blocked() {
            None
        } else {
            let signals = self.lookup_signals(&event).await;
            let recommendation = self.engine.decide(
                signals.as_ref(),
                assessment.score,
                &event.behavior,
                event.occurred_at,
            );
            info!(
                strategy = %recommendation.strategy,
                multiplier = recommendation.multiplier,
                confidence = recommendation.confidence,
                "Bid decision"
            );
            Some(recommendation)
        };

        let outcome = self
            .orchestrator
            .dispatch_with_retry(
                Arc::clone(&event),
                assessment.clone(),
                recommendation.clone(),
                policy,
            )
            .await;

        if !outcome.persisted {
            return Err(GatewayError::persistence(
                &event.event_id,
                outcome
                    .persistence_error
                    .unwrap_or_else(|| "analytics record not written".to_string()),
            ));
        }

        Ok(GatewayResponse {
            event_id: event.event_id.clone(),
            assessment,
            recommendation,
            outcome,
        })
    }

    async fn check_rate_limit(&self, event: &TrackingEvent) -> bool {
        let Some(limiter) = &self.rate_limiter else {
            return false;
        };
        let Some(key) = rate_limit_key(event) else {
            return false;
        };
        let window = limiter.config.window();

        // A redelivered event_id does not count against its subject again
        match limiter.store.increment(&sighting_key(event), window).await {
            Ok(1) => {}
            Ok(_) => {
                debug!("Event id already counted in this window");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Rate-limit store unavailable, treating as not limited");
                return false;
            }
        }

        match limiter.store.increment(&key, window).await {
            Ok(count) => count > limiter.config.max_events,
            Err(e) => {
                warn!(error = %e, "Rate-limit store unavailable, treating as not limited");
                false
            }
        }
    }

    async fn lookup_signals(&self, event: &TrackingEvent) -> Option<PredictionSignals> {
        let source = self.predictions.as_ref()?;
        let subject_id = event.subject_id.as_deref()?;

        match source.get(subject_id).await {
            Ok(signals) => signals,
            Err(e) => {
                warn!(error = %e, "Prediction lookup failed, using new-visitor priors");
                None
            }
        }
    }
}

fn sighting_key(event: &TrackingEvent) -> String {
    format!("event:{}", event.event_id)
}

/// Counter key: the subject id, else a SHA-256 digest of the client IP
pub fn rate_limit_key(event: &TrackingEvent) -> Option<String> {
    if let Some(subject_id) = &event.subject_id {
        return Some(format!("subject:{}", subject_id));
    }
    event.client_ip().map(|ip| {
        let digest = Sha256::digest(ip.as_bytes());
        format!("ip:{}", hex::encode(digest))
    })
}
