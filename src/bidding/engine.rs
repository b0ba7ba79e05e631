use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::audience::audience_signal;
use super::rules::{classify, RuleInput};
use super::types::{
    BidRecommendation, BidStrategy, NormalizedSignals, PlatformRecommendation, PredictionSignals,
};
use crate::common::types::{BehaviorMetrics, PlatformId};
use crate::config::types::BidConfig;

/// New-visitor priors used when a signal is missing
const DEFAULT_LTV: f64 = 0.3;
const DEFAULT_PROPENSITY: f64 = 0.3;
const DEFAULT_CHURN: f64 = 0.3;
const DEFAULT_RECENCY: f64 = 0.5;

/// Days after which recency decays to zero
const RECENCY_HORIZON_DAYS: f64 = 90.0;

/// Number of signal fields counted for confidence
const SIGNAL_FIELDS: f64 = 5.0;

/// Pure bid decision engine
///
/// Holds only read-only configuration; [`BidDecisionEngine::decide`] has no
/// hidden state, so identical inputs always produce identical output.
#[derive(Debug, Clone)]
pub struct BidDecisionEngine {
    config: BidConfig,
    platforms: Vec<PlatformId>,
}

impl BidDecisionEngine {
    /// Engine producing per-platform output for every platform with a
    /// configured adjustment factor
    pub fn new(config: BidConfig) -> Self {
        let platforms = config.platform_adjustments.keys().cloned().collect();
        Self { config, platforms }
    }

    /// Produce per-platform output for exactly these platforms
    pub fn with_platforms(mut self, platforms: Vec<PlatformId>) -> Self {
        let mut platforms = platforms;
        platforms.sort();
        platforms.dedup();
        self.platforms = platforms;
        self
    }

    pub fn config(&self) -> &BidConfig {
        &self.config
    }

    /// Compute a recommendation
    ///
    /// # Arguments
    /// * `signals` - Predictive signals, `None` for a subject never scored
    /// * `trust_score` - Score from the trust scorer
    /// * `behavior` - On-page behavior of the current event
    /// * `as_of` - Reference time for signal staleness (the event time)
    pub fn decide(
        &self,
        signals: Option<&PredictionSignals>,
        trust_score: f64,
        behavior: &BehaviorMetrics,
        as_of: DateTime<Utc>,
    ) -> BidRecommendation {
        let trust_score = unit(trust_score, 0.0);
        let normalized = normalize(signals, behavior);
        let stale = self.is_stale(signals, as_of);

        let strategy = classify(&RuleInput {
            signals: &normalized,
            trust_score,
            exclude_trust_below: self.config.exclude_trust_below,
        });

        let multiplier = self.multiplier(strategy, &normalized);
        let confidence = self.confidence(&normalized, trust_score, stale);
        let reasons = self.reasons(strategy, &normalized, trust_score, stale);

        let per_platform = self
            .platforms
            .iter()
            .map(|platform| {
                let adjusted = round_to(multiplier * self.config.adjustment_for(platform), 2);
                (
                    platform.clone(),
                    PlatformRecommendation {
                        multiplier: adjusted,
                        audience_signal: audience_signal(&self.config, strategy, platform),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        BidRecommendation {
            strategy,
            multiplier,
            confidence,
            reasons,
            per_platform,
        }
    }

    /// Map the weighted score into the strategy band, then into the global bounds
    fn multiplier(&self, strategy: BidStrategy, s: &NormalizedSignals) -> f64 {
        if strategy == BidStrategy::Exclude {
            return 0.0;
        }

        let weighted = (0.35 * s.ltv_score
            + 0.35 * s.propensity_score
            + 0.15 * (1.0 - s.churn_risk)
            + 0.15 * s.recency_score)
            .clamp(0.0, 1.0);

        let (low, high) = strategy.band();
        let banded = round_to(low + weighted * (high - low), 4);
        banded.clamp(self.config.min_multiplier, self.config.max_multiplier)
    }

    fn confidence(&self, s: &NormalizedSignals, trust_score: f64, stale: bool) -> f64 {
        let availability = f64::from(s.supplied_fields) / SIGNAL_FIELDS;
        let freshness = if stale {
            self.config.stale_confidence_factor
        } else {
            1.0
        };
        round_to(availability * trust_score * freshness, 2)
    }

    fn is_stale(&self, signals: Option<&PredictionSignals>, as_of: DateTime<Utc>) -> bool {
        match (
            self.config.signal_max_age(),
            signals.and_then(|s| s.computed_at),
        ) {
            (Some(max_age), Some(computed_at)) => as_of - computed_at > max_age,
            _ => false,
        }
    }

    fn reasons(
        &self,
        strategy: BidStrategy,
        s: &NormalizedSignals,
        trust_score: f64,
        stale: bool,
    ) -> Vec<String> {
        if strategy == BidStrategy::Exclude {
            return vec![
                format!(
                    "Excluded from spend: trust score {:.2} is below exclusion threshold {:.2}",
                    trust_score, self.config.exclude_trust_below
                ),
                "All platform multipliers set to 0".to_string(),
            ];
        }

        let mut reasons = Vec::with_capacity(7);

        if !s.has_predictions {
            reasons.push("No predictive signals for subject; using new-visitor priors".to_string());
        }

        reasons.push(if s.ltv_score >= 0.7 {
            format!("High LTV tier ({:.2})", s.ltv_score)
        } else if s.ltv_score >= 0.4 {
            format!("Mid LTV tier ({:.2})", s.ltv_score)
        } else {
            format!("Low LTV tier ({:.2})", s.ltv_score)
        });

        reasons.push(if s.propensity_score >= 0.5 {
            format!("High conversion propensity ({:.2})", s.propensity_score)
        } else if s.propensity_score >= 0.3 {
            format!("Moderate conversion propensity ({:.2})", s.propensity_score)
        } else {
            format!("Low conversion propensity ({:.2})", s.propensity_score)
        });

        reasons.push(if s.churn_risk >= 0.6 {
            format!("High churn risk ({:.2})", s.churn_risk)
        } else if s.churn_risk >= 0.3 {
            format!("Moderate churn risk ({:.2})", s.churn_risk)
        } else {
            format!("Low churn risk ({:.2})", s.churn_risk)
        });

        reasons.push(if s.engagement_score >= 0.6 {
            format!("High engagement ({:.2})", s.engagement_score)
        } else {
            format!("Limited engagement ({:.2})", s.engagement_score)
        });

        reasons.push(format!(
            "Trust score {:.2} clears exclusion threshold {:.2}",
            trust_score, self.config.exclude_trust_below
        ));

        if stale {
            reasons.push(format!(
                "Predictive signals older than {}h; confidence discounted",
                self.config.signal_max_age_hours
            ));
        }

        reasons
    }
}

/// Map raw signals (or their absence) onto [0, 1] scores
pub fn normalize(signals: Option<&PredictionSignals>, behavior: &BehaviorMetrics) -> NormalizedSignals {
    let behavioral = behavior_engagement(behavior);
    let behavior_counts = u8::from(behavior.has_activity());

    let Some(signals) = signals else {
        return NormalizedSignals {
            ltv_score: DEFAULT_LTV,
            propensity_score: DEFAULT_PROPENSITY,
            churn_risk: DEFAULT_CHURN,
            recency_score: DEFAULT_RECENCY,
            engagement_score: behavioral,
            supplied_fields: behavior_counts,
            has_predictions: false,
        };
    };

    let mut supplied = 0u8;
    let mut take = |value: Option<f64>, default: f64| match value.filter(|v| v.is_finite()) {
        Some(v) => {
            supplied += 1;
            v.clamp(0.0, 1.0)
        }
        None => default,
    };

    let ltv_score = take(signals.ltv_percentile.map(|p| p / 100.0), DEFAULT_LTV);
    let propensity_score = take(signals.propensity_score, DEFAULT_PROPENSITY);
    let churn_risk = take(signals.churn_probability, DEFAULT_CHURN);
    let recency_score = take(
        signals
            .recency_days
            .map(|days| 1.0 - days.max(0.0) / RECENCY_HORIZON_DAYS),
        DEFAULT_RECENCY,
    );
    let history = take(signals.engagement_score, f64::NAN);

    let (engagement_score, supplied_fields) = if history.is_nan() {
        (behavioral, supplied + behavior_counts)
    } else {
        (history, supplied)
    };

    NormalizedSignals {
        ltv_score,
        propensity_score,
        churn_risk,
        recency_score,
        engagement_score,
        supplied_fields,
        has_predictions: true,
    }
}

/// Capped weighted sum of on-page behavior
///
/// Scroll depth contributes up to 0.4 at 100%, time on page up to 0.3 at
/// 60s, clicks up to 0.3 at 10 clicks.
pub fn behavior_engagement(behavior: &BehaviorMetrics) -> f64 {
    let scroll = unit(behavior.scroll_depth / 100.0, 0.0);
    let time = (behavior.time_on_page_ms as f64 / 60_000.0).min(1.0);
    let clicks = (f64::from(behavior.clicks) / 10.0).min(1.0);
    (0.4 * scroll + 0.3 * time + 0.3 * clicks).min(1.0)
}

fn unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
