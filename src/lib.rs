//! Conversion Gateway Library
//!
//! Real-time trust scoring, bid decisioning and multi-platform dispatch
//! for server-side tracking events.

pub mod bidding;
pub mod common;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod platforms;
pub mod storage;
pub mod trust;

// Re-export commonly used types
pub use bidding::{BidDecisionEngine, BidRecommendation, BidStrategy, PredictionSignals};
pub use common::errors::{GatewayError, Result};
pub use common::retry::RetryPolicy;
pub use common::traits::{AnalyticsSink, PlatformAdapter, PredictionSource, RateLimitStore};
pub use common::types::{BehaviorMetrics, EventName, InboundEvent, PlatformId, TrackingEvent};
pub use config::types::AppConfig;
pub use dispatch::{DispatchOrchestrator, DispatchOutcome, EventStage, PlatformResult};
pub use gateway::{Gateway, GatewayResponse};
pub use platforms::{HttpPlatformAdapter, PlatformRegistry};
pub use trust::{TrustAction, TrustAssessment, TrustScorer};
