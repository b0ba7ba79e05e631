//! Trait definitions for the gateway's external collaborators

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::errors::Result;
use super::types::{PlatformId, TrackingEvent};
use crate::bidding::{BidRecommendation, PredictionSignals};
use crate::dispatch::{AnalyticsRecord, AppendReceipt, PlatformResult};

/// Uniform send contract for one downstream advertising platform
///
/// Implementations must treat a re-delivered `event_id` as a no-op or an
/// overwrite, never as a second conversion.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter delivers to
    fn platform(&self) -> &PlatformId;

    /// Deliver one event with its bid recommendation
    ///
    /// The caller bounds this call with a timeout. An `Err` is recorded as
    /// an unsent result for this platform only.
    async fn send(
        &self,
        event: &TrackingEvent,
        recommendation: &BidRecommendation,
    ) -> Result<PlatformResult>;
}

/// Durable append-only store for the full outcome of every event
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Append the record, deduplicating on `event_id`
    ///
    /// `Err` means the record is not durable and the event must be retried.
    async fn append(&self, record: &AnalyticsRecord) -> Result<AppendReceipt>;

    /// Attach settled platform results to an already appended record
    ///
    /// Best effort; used for out-of-band reconciliation of failed deliveries.
    async fn record_delivery(
        &self,
        _event_id: &str,
        _results: &BTreeMap<PlatformId, PlatformResult>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Lookup of batch-computed predictive signals keyed by subject id
#[async_trait]
pub trait PredictionSource: Send + Sync {
    /// `Ok(None)` is the expected answer for a subject never scored before
    async fn get(&self, subject_id: &str) -> Result<Option<PredictionSignals>>;
}

/// Externally owned counter with atomic increment-with-expiry
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the counter for `key` and return the new count
    ///
    /// The counter resets once `window` has elapsed since its first increment.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64>;

    /// Drop counters whose window has closed and return how many went
    async fn purge_expired(&self) -> Result<u64>;
}

/// Shared handles used by the orchestrator and gateway
pub type SharedPlatformAdapter = Arc<dyn PlatformAdapter>;
pub type SharedAnalyticsSink = Arc<dyn AnalyticsSink>;
pub type SharedPredictionSource = Arc<dyn PredictionSource>;
pub type SharedRateLimitStore = Arc<dyn RateLimitStore>;
