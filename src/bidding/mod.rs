//! Bid decisioning
//!
//! Converts trust and predictive signals into a bounded spend multiplier and
//! per-platform recommendations.
//!
//! # Pipeline
//!
//! ```text
//!  PredictionSignals? + BehaviorMetrics
//!        │
//!        ▼
//!  normalize()            → ltv / propensity / churn / recency / engagement
//!        │
//!        ▼
//!  STRATEGY_RULES         → first matching rule picks the BidStrategy
//!        │
//!        ▼
//!  strategy band + global bounds → multiplier
//!        │
//!        ▼
//!  platform adjustments + audience table → per-platform output
//! ```
//!
//! Everything here is pure; [`BidDecisionEngine::decide`] can be replayed
//! with the same inputs and yields the same recommendation.

mod audience;
mod engine;
mod rules;
mod types;

pub use audience::audience_signal;
pub use engine::{behavior_engagement, normalize, BidDecisionEngine};
pub use rules::{classify, first_match, RuleInput, StrategyRule, STRATEGY_RULES};
pub use types::{
    BidRecommendation, BidStrategy, NormalizedSignals, PlatformRecommendation, PredictionSignals,
};
