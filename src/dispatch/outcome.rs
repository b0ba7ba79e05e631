use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bidding::BidRecommendation;
use crate::common::types::{PlatformId, TrackingEvent};
use crate::trust::{TrustAction, TrustAssessment};

/// Lifecycle of one event inside the gateway
///
/// `Received → Scored → Blocked` (analytics only) or
/// `Received → Scored → Dispatching → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStage {
    Received,
    Scored,
    Blocked,
    Dispatching,
    Completed,
}

impl std::fmt::Display for EventStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventStage::Received => "RECEIVED",
            EventStage::Scored => "SCORED",
            EventStage::Blocked => "BLOCKED",
            EventStage::Dispatching => "DISPATCHING",
            EventStage::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// How a single platform call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Accepted by the platform
    Delivered,
    /// Platform already had this event_id
    Duplicate,
    /// Platform refused the payload
    Rejected,
    /// Transport or server error
    Failed,
    /// No answer within the per-call timeout
    TimedOut,
}

/// Result slot for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub sent: bool,
    pub status: DeliveryStatus,
    /// HTTP status when the platform answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlatformResult {
    pub fn delivered(status_code: Option<u16>) -> Self {
        Self {
            sent: true,
            status: DeliveryStatus::Delivered,
            status_code,
            error: None,
        }
    }

    pub fn duplicate(status_code: Option<u16>) -> Self {
        Self {
            sent: true,
            status: DeliveryStatus::Duplicate,
            status_code,
            error: None,
        }
    }

    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            sent: false,
            status: DeliveryStatus::Rejected,
            status_code: Some(status_code),
            error: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            sent: false,
            status: DeliveryStatus::Failed,
            status_code: None,
            error: Some(message.into()),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            sent: false,
            status: DeliveryStatus::TimedOut,
            status_code: None,
            error: Some("timeout".to_string()),
        }
    }
}

/// Everything written to the analytics sink for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub event: TrackingEvent,
    pub assessment: TrustAssessment,
    pub recommendation: Option<BidRecommendation>,
    /// Platforms the event is being sent to; empty when nothing is dispatched
    pub dispatch_plan: Vec<PlatformId>,
    pub recorded_at: DateTime<Utc>,
}

/// Acknowledgement from the analytics sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// The sink already held a record for this event_id
    pub duplicate: bool,
}

/// Aggregated result of dispatching one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub event_id: String,
    pub stage: EventStage,
    pub action: TrustAction,
    pub per_platform_result: BTreeMap<PlatformId, PlatformResult>,
    /// The only field callers must check to know the event was not lost
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

impl DispatchOutcome {
    pub fn sent_count(&self) -> usize {
        self.per_platform_result.values().filter(|r| r.sent).count()
    }

    /// Platforms whose delivery needs reconciliation
    pub fn failed_platforms(&self) -> Vec<&PlatformId> {
        self.per_platform_result
            .iter()
            .filter(|(_, r)| !r.sent)
            .map(|(p, _)| p)
            .collect()
    }
}
