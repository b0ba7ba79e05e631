//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use conversion_gateway::common::errors::{GatewayError, Result};
use conversion_gateway::common::traits::{AnalyticsSink, PlatformAdapter};
use conversion_gateway::dispatch::{AnalyticsRecord, AppendReceipt};
use conversion_gateway::storage::InMemoryAnalyticsSink;
use conversion_gateway::{
    BehaviorMetrics, BidRecommendation, InboundEvent, PlatformId, PlatformResult, TrackingEvent,
};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a [`FakeAdapter`] answers
#[derive(Debug, Clone)]
pub enum FakeReply {
    Delivered,
    Rejected(u16),
    Error(String),
}

/// Platform adapter that records calls and answers after an optional delay
#[derive(Debug)]
pub struct FakeAdapter {
    platform: PlatformId,
    delay: Duration,
    reply: FakeReply,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, f64)>>,
}

impl FakeAdapter {
    pub fn new(platform: &str, delay: Duration, reply: FakeReply) -> Arc<Self> {
        Arc::new(Self {
            platform: PlatformId::new(platform),
            delay,
            reply,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn delivered(platform: &str) -> Arc<Self> {
        Self::new(platform, Duration::ZERO, FakeReply::Delivered)
    }

    pub fn slow(platform: &str, delay: Duration) -> Arc<Self> {
        Self::new(platform, delay, FakeReply::Delivered)
    }

    pub fn failing(platform: &str, message: &str) -> Arc<Self> {
        Self::new(platform, Duration::ZERO, FakeReply::Error(message.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (event_id, platform multiplier) of every delivery attempt
    pub fn seen(&self) -> Vec<(String, f64)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> &PlatformId {
        &self.platform
    }

    async fn send(
        &self,
        event: &TrackingEvent,
        recommendation: &BidRecommendation,
    ) -> Result<PlatformResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let multiplier = recommendation
            .for_platform(&self.platform)
            .map(|p| p.multiplier)
            .unwrap_or(recommendation.multiplier);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((event.event_id.clone(), multiplier));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.reply {
            FakeReply::Delivered => Ok(PlatformResult::delivered(Some(200))),
            FakeReply::Rejected(code) => Ok(PlatformResult::rejected(*code, "rejected")),
            FakeReply::Error(message) => Err(GatewayError::PlatformDelivery {
                platform: self.platform.to_string(),
                message: message.clone(),
            }),
        }
    }
}

/// Analytics sink that fails the first `failures` appends, then delegates
/// to an in-memory sink
#[derive(Debug, Default)]
pub struct FlakySink {
    failures: u32,
    attempts: AtomicU32,
    pub inner: InMemoryAnalyticsSink,
}

impl FlakySink {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Default::default()
        })
    }

    /// A sink that never accepts a record
    pub fn down() -> Arc<Self> {
        Self::new(u32::MAX)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsSink for FlakySink {
    async fn append(&self, record: &AnalyticsRecord) -> Result<AppendReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(GatewayError::persistence(
                &record.event.event_id,
                "connection reset by peer",
            ));
        }
        self.inner.append(record).await
    }
}

/// Analytics sink whose delivery updates take `delay` to land
#[derive(Debug, Default)]
pub struct SlowDeliverySink {
    delay: Duration,
    pub inner: InMemoryAnalyticsSink,
}

impl SlowDeliverySink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AnalyticsSink for SlowDeliverySink {
    async fn append(&self, record: &AnalyticsRecord) -> Result<AppendReceipt> {
        self.inner.append(record).await
    }

    async fn record_delivery(
        &self,
        event_id: &str,
        results: &BTreeMap<PlatformId, PlatformResult>,
    ) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.record_delivery(event_id, results).await
    }
}

/// Headers of an ordinary desktop browser
pub fn browser_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "User-Agent".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        (
            "Sec-CH-UA".to_string(),
            r#""Chromium";v="124", "Google Chrome";v="124""#.to_string(),
        ),
        ("X-Forwarded-For".to_string(), "203.0.113.7, 10.0.0.1".to_string()),
    ])
}

/// Headers of a scripted client
pub fn bot_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("User-Agent".to_string(), "python-requests/2.31.0".to_string()),
        ("X-Forwarded-For".to_string(), "198.51.100.23".to_string()),
    ])
}

/// Behavior of a visitor that read the page
pub fn engaged_behavior() -> BehaviorMetrics {
    BehaviorMetrics::new(60.0, 12_000, 3)
}

/// A purchase from a trusted browser session (trust 0.9)
pub fn sample_purchase(event_id: &str, subject_id: Option<&str>) -> InboundEvent {
    InboundEvent {
        event_id: Some(event_id.to_string()),
        subject_id: subject_id.map(str::to_string),
        event_name: Some("Purchase".to_string()),
        occurred_at: Some(Utc::now()),
        value: Some(dec!(129.90)),
        currency: Some("usd".to_string()),
        click_ids: BTreeMap::from([("gclid".to_string(), "Cj0KCQ_test".to_string())]),
        headers: browser_headers(),
        behavior: Some(engaged_behavior()),
    }
}

/// A page view sent by a bot (trust 0.0)
pub fn sample_bot_event(event_id: &str) -> InboundEvent {
    InboundEvent {
        event_id: Some(event_id.to_string()),
        event_name: Some("PageView".to_string()),
        headers: bot_headers(),
        ..Default::default()
    }
}
