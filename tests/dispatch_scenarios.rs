//! Acceptance scenarios for gating, exclusion and platform timeouts

mod common;

use chrono::Utc;
use common::{sample_bot_event, sample_purchase, FakeAdapter, SlowDeliverySink};
use conversion_gateway::common::traits::{SharedAnalyticsSink, SharedPlatformAdapter};
use conversion_gateway::dispatch::DeliveryStatus;
use conversion_gateway::storage::InMemoryAnalyticsSink;
use conversion_gateway::{
    AppConfig, BehaviorMetrics, BidDecisionEngine, BidStrategy, DispatchOrchestrator, EventStage,
    Gateway, InboundEvent, PlatformId, PredictionSignals, TrackingEvent, TrustAction,
    TrustAssessment,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn adapters(fakes: &[&Arc<FakeAdapter>]) -> Vec<SharedPlatformAdapter> {
    fakes
        .iter()
        .map(|fake| Arc::clone(*fake) as SharedPlatformAdapter)
        .collect()
}

#[test]
fn test_untrusted_traffic_gets_exclude_with_zero_multiplier() {
    let engine = BidDecisionEngine::new(AppConfig::default().bid);
    let strong = PredictionSignals {
        ltv_percentile: Some(99.0),
        propensity_score: Some(0.95),
        churn_probability: Some(0.01),
        ..Default::default()
    };

    for signals in [None, Some(&strong)] {
        let rec = engine.decide(signals, 0.15, &BehaviorMetrics::default(), Utc::now());
        assert_eq!(rec.strategy, BidStrategy::Exclude);
        assert_eq!(rec.multiplier, 0.0);
        assert!(rec.per_platform.values().all(|p| p.multiplier == 0.0));
    }
}

#[tokio::test]
async fn test_excluded_event_is_recorded_but_never_sent() {
    // Low block threshold so a 0.2 score is challenged rather than blocked
    let mut config = AppConfig::default();
    config.trust.block_threshold = 0.1;

    let google = FakeAdapter::delivered("google");
    let meta = FakeAdapter::delivered("meta");
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let gateway = Gateway::new(
        &config,
        adapters(&[&google, &meta]),
        sink.clone() as SharedAnalyticsSink,
    );

    let event = InboundEvent {
        event_id: Some("evt_headless".to_string()),
        event_name: Some("AddToCart".to_string()),
        headers: BTreeMap::from([
            (
                "user-agent".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/124.0".to_string(),
            ),
            ("accept-language".to_string(), "en-US".to_string()),
        ]),
        ..Default::default()
    };

    let response = gateway.process(event).await.unwrap();

    assert_eq!(response.assessment.score, 0.2);
    assert_eq!(response.assessment.action, TrustAction::Challenge);
    let rec = response.recommendation.unwrap();
    assert_eq!(rec.strategy, BidStrategy::Exclude);
    assert_eq!(rec.multiplier, 0.0);

    assert!(response.outcome.per_platform_result.is_empty());
    assert!(response.outcome.persisted);
    assert_eq!(google.calls() + meta.calls(), 0);
    assert!(sink.get("evt_headless").unwrap().dispatch_plan.is_empty());
}

#[tokio::test]
async fn test_blocked_event_has_no_platform_results_and_is_persisted() {
    let google = FakeAdapter::delivered("google");
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let gateway = Gateway::new(
        &AppConfig::default(),
        adapters(&[&google]),
        sink.clone() as SharedAnalyticsSink,
    );

    let response = gateway.process(sample_bot_event("evt_bot")).await.unwrap();

    assert_eq!(response.assessment.action, TrustAction::Block);
    assert!(response.recommendation.is_none());
    assert!(response.outcome.per_platform_result.is_empty());
    assert!(response.outcome.persisted);
    assert_eq!(response.outcome.stage, EventStage::Blocked);
    assert_eq!(google.calls(), 0);

    let stored = sink.get("evt_bot").unwrap();
    assert_eq!(stored.assessment.action, TrustAction::Block);
    assert!(!stored.assessment.reasons.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_platform_times_out_without_delaying_others() {
    let platform_timeout = Duration::from_millis(2000);
    let slow = FakeAdapter::slow("tiktok", Duration::from_secs(30));
    let fast = FakeAdapter::delivered("google");
    let sink = Arc::new(InMemoryAnalyticsSink::new());

    let orchestrator = DispatchOrchestrator::new(
        adapters(&[&slow, &fast]),
        sink.clone() as SharedAnalyticsSink,
    )
    .with_platform_timeout(platform_timeout);

    let event = Arc::new(
        TrackingEvent::from_inbound(sample_purchase("evt_slow", None), Utc::now()).unwrap(),
    );
    let recommendation = BidDecisionEngine::new(AppConfig::default().bid).decide(
        None,
        0.9,
        &event.behavior,
        event.occurred_at,
    );
    let assessment = TrustAssessment {
        score: 0.9,
        action: TrustAction::Allow,
        reasons: Vec::new(),
    };

    let started = Instant::now();
    let outcome = orchestrator
        .dispatch(Arc::clone(&event), assessment, Some(recommendation))
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= platform_timeout);
    assert!(elapsed < platform_timeout + Duration::from_millis(100));

    let tiktok = &outcome.per_platform_result[&PlatformId::new("tiktok")];
    assert!(!tiktok.sent);
    assert_eq!(tiktok.status, DeliveryStatus::TimedOut);
    assert_eq!(tiktok.error.as_deref(), Some("timeout"));

    let google = &outcome.per_platform_result[&PlatformId::new("google")];
    assert!(google.sent);
    assert_eq!(google.status, DeliveryStatus::Delivered);

    assert!(outcome.persisted);
    assert_eq!(outcome.stage, EventStage::Completed);
    assert_eq!(outcome.failed_platforms(), vec![&PlatformId::new("tiktok")]);

    orchestrator.settle_deliveries().await;
    assert_eq!(sink.deliveries("evt_slow").unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_delivery_update_does_not_delay_the_outcome() {
    let platform_timeout = Duration::from_millis(2000);
    let slow = FakeAdapter::slow("tiktok", Duration::from_secs(30));
    let fast = FakeAdapter::delivered("google");
    let sink = SlowDeliverySink::new(Duration::from_secs(4));

    let orchestrator = DispatchOrchestrator::new(
        adapters(&[&slow, &fast]),
        sink.clone() as SharedAnalyticsSink,
    )
    .with_platform_timeout(platform_timeout);

    let event = Arc::new(
        TrackingEvent::from_inbound(sample_purchase("evt_lagging", None), Utc::now()).unwrap(),
    );
    let recommendation =
        BidDecisionEngine::new(AppConfig::default().bid).decide(None, 0.9, &event.behavior, event.occurred_at);
    let assessment = TrustAssessment {
        score: 0.9,
        action: TrustAction::Allow,
        reasons: Vec::new(),
    };

    let started = Instant::now();
    let outcome = orchestrator
        .dispatch(Arc::clone(&event), assessment, Some(recommendation))
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed < platform_timeout + Duration::from_millis(100));
    assert!(outcome.persisted);
    assert_eq!(outcome.per_platform_result.len(), 2);
    assert!(sink.inner.deliveries("evt_lagging").is_none());

    orchestrator.settle_deliveries().await;
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert_eq!(sink.inner.deliveries("evt_lagging").unwrap().len(), 2);
}

#[tokio::test]
async fn test_failing_platform_does_not_affect_others() {
    let broken = FakeAdapter::failing("meta", "503 from collector");
    let google = FakeAdapter::delivered("google");
    let tiktok = FakeAdapter::delivered("tiktok");
    let sink = Arc::new(InMemoryAnalyticsSink::new());
    let gateway = Gateway::new(
        &AppConfig::default(),
        adapters(&[&broken, &google, &tiktok]),
        sink as SharedAnalyticsSink,
    );

    let response = gateway
        .process(sample_purchase("evt_partial", Some("sub_1")))
        .await
        .unwrap();

    let results = &response.outcome.per_platform_result;
    assert_eq!(results.len(), 3);
    assert!(!results[&PlatformId::new("meta")].sent);
    assert!(results[&PlatformId::new("google")].sent);
    assert!(results[&PlatformId::new("tiktok")].sent);
    assert_eq!(response.outcome.sent_count(), 2);
    assert!(response.outcome.persisted);
}
