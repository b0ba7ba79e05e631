//! Strategy × platform audience-signal labels

use super::types::BidStrategy;
use crate::common::types::PlatformId;
use crate::config::types::BidConfig;

/// Built-in labels for the platforms we ship adapters for
const AUDIENCE_TABLE: &[(BidStrategy, &str, &str)] = &[
    (BidStrategy::Aggressive, "google", "high_value_customers"),
    (BidStrategy::Aggressive, "meta", "lookalike_top_ltv"),
    (BidStrategy::Aggressive, "tiktok", "high_intent_buyers"),
    (BidStrategy::Retention, "google", "at_risk_high_value"),
    (BidStrategy::Retention, "meta", "retention_custom_audience"),
    (BidStrategy::Retention, "tiktok", "re_engagement"),
    (BidStrategy::Acquisition, "google", "engaged_new_visitors"),
    (BidStrategy::Acquisition, "meta", "broad_prospecting"),
    (BidStrategy::Acquisition, "tiktok", "interest_expansion"),
    (BidStrategy::Nurture, "google", "standard_remarketing"),
    (BidStrategy::Nurture, "meta", "warm_audience"),
    (BidStrategy::Nurture, "tiktok", "nurture_sequence"),
    (BidStrategy::Conservative, "google", "low_priority"),
    (BidStrategy::Conservative, "meta", "cold_audience"),
    (BidStrategy::Conservative, "tiktok", "broad_low_bid"),
];

/// Label used for platforms without a table entry
fn generic_label(strategy: BidStrategy) -> &'static str {
    match strategy {
        BidStrategy::Aggressive => "high_value",
        BidStrategy::Retention => "retention",
        BidStrategy::Acquisition => "prospecting",
        BidStrategy::Nurture => "remarketing",
        BidStrategy::Conservative => "low_priority",
        BidStrategy::Exclude => "exclude",
    }
}

/// Resolve the audience label for a strategy on a platform
///
/// Configured overrides take precedence over the built-in table. Excluded
/// traffic is always labelled `exclude`.
pub fn audience_signal(config: &BidConfig, strategy: BidStrategy, platform: &PlatformId) -> String {
    if strategy == BidStrategy::Exclude {
        return generic_label(strategy).to_string();
    }

    if let Some(label) = config
        .audience_overrides
        .get(platform)
        .and_then(|labels| labels.get(&strategy))
    {
        return label.clone();
    }

    AUDIENCE_TABLE
        .iter()
        .find(|(s, p, _)| *s == strategy && *p == platform.as_str())
        .map(|(_, _, label)| *label)
        .unwrap_or_else(|| generic_label(strategy))
        .to_string()
}
