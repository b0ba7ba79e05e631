//! In-process implementations for tests and dry runs

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::bidding::PredictionSignals;
use crate::common::errors::{GatewayError, Result};
use crate::common::traits::{AnalyticsSink, PredictionSource, RateLimitStore};
use crate::common::types::PlatformId;
use crate::dispatch::{AnalyticsRecord, AppendReceipt, PlatformResult};

fn poisoned<T>(_: T) -> GatewayError {
    GatewayError::Internal("in-memory store lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: AnalyticsRecord,
    delivery: Option<BTreeMap<PlatformId, PlatformResult>>,
}

/// Analytics sink keeping records in a map keyed by event_id
///
/// A second append for the same event_id is acknowledged as a duplicate and
/// leaves the first record untouched.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsSink {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_id: &str) -> Option<AnalyticsRecord> {
        self.records
            .lock()
            .ok()?
            .get(event_id)
            .map(|stored| stored.record.clone())
    }

    pub fn deliveries(&self, event_id: &str) -> Option<BTreeMap<PlatformId, PlatformResult>> {
        self.records
            .lock()
            .ok()?
            .get(event_id)
            .and_then(|stored| stored.delivery.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn append(&self, record: &AnalyticsRecord) -> Result<AppendReceipt> {
        let mut records = self.records.lock().map_err(poisoned)?;
        if records.contains_key(&record.event.event_id) {
            return Ok(AppendReceipt { duplicate: true });
        }
        records.insert(
            record.event.event_id.clone(),
            StoredRecord {
                record: record.clone(),
                delivery: None,
            },
        );
        Ok(AppendReceipt { duplicate: false })
    }

    async fn record_delivery(
        &self,
        event_id: &str,
        results: &BTreeMap<PlatformId, PlatformResult>,
    ) -> Result<()> {
        let mut records = self.records.lock().map_err(poisoned)?;
        if let Some(stored) = records.get_mut(event_id) {
            stored.delivery = Some(results.clone());
        }
        Ok(())
    }
}

/// Prediction lookup backed by a fixed map
#[derive(Debug, Default)]
pub struct InMemoryPredictionSource {
    signals: HashMap<String, PredictionSignals>,
}

impl InMemoryPredictionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>, signals: PredictionSignals) -> Self {
        self.signals.insert(subject_id.into(), signals);
        self
    }
}

#[async_trait]
impl PredictionSource for InMemoryPredictionSource {
    async fn get(&self, subject_id: &str) -> Result<Option<PredictionSignals>> {
        Ok(self.signals.get(subject_id).cloned())
    }
}

/// Fixed-window counter held in process memory
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live or not yet evicted counters
    pub fn len(&self) -> usize {
        self.counters.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().map_err(poisoned)?;
        counters.retain(|_, (_, expires_at)| *expires_at > now);
        let entry = counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().map_err(poisoned)?;
        let before = counters.len();
        counters.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - counters.len()) as u64)
    }
}
