use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::types::PlatformId;

/// Categorical bidding posture for a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStrategy {
    Aggressive,
    Retention,
    Acquisition,
    Nurture,
    Conservative,
    Exclude,
}

impl BidStrategy {
    /// Multiplier sub-band `(low, high)` the weighted score is mapped into
    pub fn band(self) -> (f64, f64) {
        match self {
            BidStrategy::Aggressive => (1.5, 2.0),
            BidStrategy::Retention => (1.3, 1.5),
            BidStrategy::Acquisition => (1.1, 1.3),
            BidStrategy::Nurture => (0.9, 1.1),
            BidStrategy::Conservative => (0.7, 0.9),
            BidStrategy::Exclude => (0.0, 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BidStrategy::Aggressive => "aggressive",
            BidStrategy::Retention => "retention",
            BidStrategy::Acquisition => "acquisition",
            BidStrategy::Nurture => "nurture",
            BidStrategy::Conservative => "conservative",
            BidStrategy::Exclude => "exclude",
        }
    }
}

impl std::fmt::Display for BidStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-computed predictive signals for one subject
///
/// Every field may be missing; missing fields fall back to new-visitor priors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSignals {
    /// Lifetime value percentile, 0-100
    #[serde(default)]
    pub ltv_percentile: Option<f64>,
    /// Probability of converting, 0-1
    #[serde(default)]
    pub propensity_score: Option<f64>,
    /// Probability of churning, 0-1
    #[serde(default)]
    pub churn_probability: Option<f64>,
    /// Days since the subject's last meaningful activity
    #[serde(default)]
    pub recency_days: Option<f64>,
    /// Historical engagement score, 0-1
    #[serde(default)]
    pub engagement_score: Option<f64>,
    /// When the batch pipeline produced these signals
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

/// Signals mapped onto [0, 1] scores, ready for classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedSignals {
    pub ltv_score: f64,
    pub propensity_score: f64,
    pub churn_risk: f64,
    pub recency_score: f64,
    pub engagement_score: f64,
    /// How many of the five scores carry real data rather than a prior
    pub supplied_fields: u8,
    /// False when the subject had no prediction record at all
    pub has_predictions: bool,
}

/// Recommendation for a single platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecommendation {
    pub multiplier: f64,
    pub audience_signal: String,
}

/// Bid recommendation attached to a dispatched event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRecommendation {
    pub strategy: BidStrategy,
    /// Spend multiplier within the configured global bounds (0 when excluded)
    pub multiplier: f64,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub per_platform: BTreeMap<PlatformId, PlatformRecommendation>,
}

impl BidRecommendation {
    pub fn for_platform(&self, platform: &PlatformId) -> Option<&PlatformRecommendation> {
        self.per_platform.get(platform)
    }

    pub fn is_excluded(&self) -> bool {
        self.strategy == BidStrategy::Exclude
    }
}
