use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::outcome::{AnalyticsRecord, DispatchOutcome, EventStage, PlatformResult};
use crate::bidding::BidRecommendation;
use crate::common::errors::{GatewayError, Result};
use crate::common::retry::{retry_with_backoff, RetryPolicy};
use crate::common::traits::{SharedAnalyticsSink, SharedPlatformAdapter};
use crate::common::types::{PlatformId, TrackingEvent};
use crate::config::types::{AppConfig, ChallengePolicy};
use crate::trust::{TrustAction, TrustAssessment};

const DEFAULT_PLATFORM_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_ANALYTICS_TIMEOUT: Duration = Duration::from_millis(5000);

/// Fans a scored event out to every enabled platform and records it in
/// analytics
///
/// Platform calls run concurrently with each other and with the analytics
/// append. Each call is bounded by its own timeout and can only affect its
/// own result slot. Analytics is written for every event, blocked or not.
/// Delivery results are attached to the record in the background, so a
/// slow sink never holds back the outcome.
pub struct DispatchOrchestrator {
    adapters: Vec<SharedPlatformAdapter>,
    sink: SharedAnalyticsSink,
    platform_timeout: Duration,
    analytics_timeout: Duration,
    challenge_policy: ChallengePolicy,
    reconciliations: Mutex<JoinSet<()>>,
}

impl DispatchOrchestrator {
    pub fn new(adapters: Vec<SharedPlatformAdapter>, sink: SharedAnalyticsSink) -> Self {
        Self {
            adapters,
            sink,
            platform_timeout: DEFAULT_PLATFORM_TIMEOUT,
            analytics_timeout: DEFAULT_ANALYTICS_TIMEOUT,
            challenge_policy: ChallengePolicy::default(),
            reconciliations: Mutex::new(JoinSet::new()),
        }
    }

    /// Build with timeouts and challenge policy taken from configuration
    pub fn from_config(
        adapters: Vec<SharedPlatformAdapter>,
        sink: SharedAnalyticsSink,
        config: &AppConfig,
    ) -> Self {
        Self::new(adapters, sink)
            .with_platform_timeout(config.platform.timeout())
            .with_analytics_timeout(config.analytics.timeout())
            .with_challenge_policy(config.trust.challenge_policy)
    }

    pub fn with_platform_timeout(mut self, timeout: Duration) -> Self {
        self.platform_timeout = timeout;
        self
    }

    pub fn with_analytics_timeout(mut self, timeout: Duration) -> Self {
        self.analytics_timeout = timeout;
        self
    }

    pub fn with_challenge_policy(mut self, policy: ChallengePolicy) -> Self {
        self.challenge_policy = policy;
        self
    }

    /// Platforms this orchestrator delivers to
    pub fn platforms(&self) -> Vec<PlatformId> {
        self.adapters.iter().map(|a| a.platform().clone()).collect()
    }

    /// Whether an event with this trust action goes to the platforms
    pub fn gates_open(&self, action: TrustAction) -> bool {
        match action {
            TrustAction::Allow => true,
            TrustAction::Challenge => self.challenge_policy == ChallengePolicy::Dispatch,
            TrustAction::Block => false,
        }
    }

    /// Dispatch one scored event and persist its record
    ///
    /// Always returns an outcome. `persisted == false` is the only fatal
    /// condition; platform failures are recorded per platform.
    pub async fn dispatch(
        &self,
        event: Arc<TrackingEvent>,
        assessment: TrustAssessment,
        recommendation: Option<BidRecommendation>,
    ) -> DispatchOutcome {
        self.dispatch_with_retry(event, assessment, recommendation, &RetryPolicy::none())
            .await
    }

    /// Like [`DispatchOrchestrator::dispatch`], retrying a failed analytics
    /// append under `policy`
    ///
    /// Platforms are called exactly once no matter how many appends it takes.
    #[instrument(skip_all, fields(event_id = %event.event_id, action = %assessment.action))]
    pub async fn dispatch_with_retry(
        &self,
        event: Arc<TrackingEvent>,
        assessment: TrustAssessment,
        recommendation: Option<BidRecommendation>,
        policy: &RetryPolicy,
    ) -> DispatchOutcome {
        let action = assessment.action;
        let recommendation = recommendation.map(Arc::new);

        let dispatching = match (&recommendation, self.gates_open(action)) {
            (Some(rec), true) if rec.is_excluded() => {
                debug!("Exclude strategy, no platform spend");
                false
            }
            (Some(_), true) => true,
            (None, true) => {
                warn!("No bid recommendation for an ungated event, recording analytics only");
                false
            }
            (_, false) => false,
        };

        let stage = if dispatching {
            EventStage::Dispatching
        } else {
            EventStage::Blocked
        };
        debug!(from = %EventStage::Scored, to = %stage, "Event stage transition");

        let record = AnalyticsRecord {
            event: (*event).clone(),
            assessment,
            recommendation: recommendation.as_deref().cloned(),
            dispatch_plan: if dispatching { self.platforms() } else { Vec::new() },
            recorded_at: Utc::now(),
        };

        let fan_out = async {
            match (&recommendation, dispatching) {
                (Some(rec), true) => self.fan_out(Arc::clone(&event), Arc::clone(rec)).await,
                _ => BTreeMap::new(),
            }
        };
        let persist = retry_with_backoff(policy, |_| self.persist(&record));
        let (per_platform_result, persistence) = tokio::join!(fan_out, persist);

        for (platform, result) in &per_platform_result {
            if !result.sent {
                warn!(
                    platform = %platform,
                    status = ?result.status,
                    error = result.error.as_deref().unwrap_or(""),
                    "Platform delivery failed"
                );
            }
        }

        let (persisted, persistence_error) = match persistence {
            Ok(()) => (true, None),
            Err(e) => {
                error!(error = %e, "Analytics persistence failed");
                let message = match e {
                    GatewayError::Persistence { message, .. } => message,
                    other => other.to_string(),
                };
                (false, Some(message))
            }
        };

        if persisted && !per_platform_result.is_empty() {
            self.reconcile_in_background(event.event_id.clone(), per_platform_result.clone());
        }

        let final_stage = if dispatching {
            EventStage::Completed
        } else {
            EventStage::Blocked
        };
        if dispatching {
            debug!(from = %EventStage::Dispatching, to = %final_stage, "Event stage transition");
        }

        let outcome = DispatchOutcome {
            event_id: event.event_id.clone(),
            stage: final_stage,
            action,
            per_platform_result,
            persisted,
            persistence_error,
        };

        info!(
            stage = %outcome.stage,
            sent = outcome.sent_count(),
            platforms = outcome.per_platform_result.len(),
            persisted = outcome.persisted,
            "Event dispatch settled"
        );

        outcome
    }

    /// Issue every platform call at once and wait for all slots to settle
    async fn fan_out(
        &self,
        event: Arc<TrackingEvent>,
        recommendation: Arc<BidRecommendation>,
    ) -> BTreeMap<PlatformId, PlatformResult> {
        // Slots start as failures so a task that never reports back
        // (panic, runtime shutdown) still yields a result for its platform
        let mut results: BTreeMap<PlatformId, PlatformResult> = self
            .adapters
            .iter()
            .map(|a| {
                (
                    a.platform().clone(),
                    PlatformResult::failed("delivery task did not complete"),
                )
            })
            .collect();

        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let event = Arc::clone(&event);
            let recommendation = Arc::clone(&recommendation);
            let limit = self.platform_timeout;

            tasks.spawn(async move {
                let platform = adapter.platform().clone();
                let result = match timeout(limit, adapter.send(&event, &recommendation)).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => PlatformResult::failed(e.to_string()),
                    Err(_) => PlatformResult::timed_out(),
                };
                (platform, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((platform, result)) => {
                    debug!(platform = %platform, sent = result.sent, "Platform call settled");
                    results.insert(platform, result);
                }
                Err(e) => error!(error = %e, "Platform delivery task aborted"),
            }
        }

        results
    }

    async fn persist(&self, record: &AnalyticsRecord) -> Result<()> {
        let event_id = &record.event.event_id;
        match timeout(self.analytics_timeout, self.sink.append(record)).await {
            Ok(Ok(receipt)) => {
                if receipt.duplicate {
                    debug!("Analytics already held this event, treated as persisted");
                }
                Ok(())
            }
            Ok(Err(e @ GatewayError::Persistence { .. })) => Err(e),
            Ok(Err(e)) => Err(GatewayError::persistence(event_id, e.to_string())),
            Err(_) => Err(GatewayError::persistence(event_id, "timeout")),
        }
    }

    /// Attach delivery results to the stored record without waiting for it
    fn reconcile_in_background(
        &self,
        event_id: String,
        results: BTreeMap<PlatformId, PlatformResult>,
    ) {
        let sink = Arc::clone(&self.sink);
        let limit = self.analytics_timeout;
        let task = async move {
            match timeout(limit, sink.record_delivery(&event_id, &results)).await {
                Ok(Ok(())) => debug!("Delivery results recorded"),
                Ok(Err(e)) => warn!(error = %e, "Failed to record delivery results"),
                Err(_) => warn!("Timed out recording delivery results"),
            }
        }
        .in_current_span();

        match self.reconciliations.lock() {
            Ok(mut pending) => {
                while pending.try_join_next().is_some() {}
                pending.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }

    /// Wait for every background delivery update started so far
    pub async fn settle_deliveries(&self) {
        let mut pending = match self.reconciliations.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Delivery update task aborted");
            }
        }
    }
}
