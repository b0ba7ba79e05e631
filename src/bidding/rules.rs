//! Ordered strategy classification rules
//!
//! Rules are evaluated top-down and the first match wins, so the position of
//! a rule in [`STRATEGY_RULES`] is part of the policy.

use super::types::{BidStrategy, NormalizedSignals};

/// Everything a rule predicate may inspect
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub signals: &'a NormalizedSignals,
    pub trust_score: f64,
    pub exclude_trust_below: f64,
}

/// One `(predicate, outcome)` pair
#[derive(Clone, Copy)]
pub struct StrategyRule {
    pub strategy: BidStrategy,
    pub description: &'static str,
    predicate: fn(&RuleInput<'_>) -> bool,
}

impl StrategyRule {
    pub fn matches(&self, input: &RuleInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

impl std::fmt::Debug for StrategyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRule")
            .field("strategy", &self.strategy)
            .field("description", &self.description)
            .finish()
    }
}

fn untrusted(input: &RuleInput<'_>) -> bool {
    input.trust_score < input.exclude_trust_below
}

fn high_value_ready_to_buy(input: &RuleInput<'_>) -> bool {
    input.signals.ltv_score >= 0.7 && input.signals.propensity_score >= 0.5
}

fn high_value_at_risk(input: &RuleInput<'_>) -> bool {
    input.signals.ltv_score >= 0.7 && input.signals.churn_risk >= 0.6
}

fn engaged_newcomer(input: &RuleInput<'_>) -> bool {
    input.signals.ltv_score < 0.4 && input.signals.engagement_score >= 0.6
}

fn some_potential(input: &RuleInput<'_>) -> bool {
    input.signals.propensity_score >= 0.3 || input.signals.ltv_score >= 0.4
}

fn always(_: &RuleInput<'_>) -> bool {
    true
}

/// Strategy policy in priority order
pub const STRATEGY_RULES: &[StrategyRule] = &[
    StrategyRule {
        strategy: BidStrategy::Exclude,
        description: "trust below exclusion threshold",
        predicate: untrusted,
    },
    StrategyRule {
        strategy: BidStrategy::Aggressive,
        description: "high LTV with high propensity",
        predicate: high_value_ready_to_buy,
    },
    StrategyRule {
        strategy: BidStrategy::Retention,
        description: "high LTV with high churn risk",
        predicate: high_value_at_risk,
    },
    StrategyRule {
        strategy: BidStrategy::Acquisition,
        description: "low LTV but highly engaged",
        predicate: engaged_newcomer,
    },
    StrategyRule {
        strategy: BidStrategy::Nurture,
        description: "moderate propensity or LTV",
        predicate: some_potential,
    },
    StrategyRule {
        strategy: BidStrategy::Conservative,
        description: "no strong signal",
        predicate: always,
    },
];

/// First rule matching the input
pub fn first_match<'r>(rules: &'r [StrategyRule], input: &RuleInput<'_>) -> Option<&'r StrategyRule> {
    rules.iter().find(|rule| rule.matches(input))
}

/// Classify with the built-in rule list
pub fn classify(input: &RuleInput<'_>) -> BidStrategy {
    first_match(STRATEGY_RULES, input)
        .map(|rule| rule.strategy)
        .unwrap_or(BidStrategy::Conservative)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(ltv: f64, propensity: f64, churn: f64, engagement: f64) -> NormalizedSignals {
        NormalizedSignals {
            ltv_score: ltv,
            propensity_score: propensity,
            churn_risk: churn,
            recency_score: 0.5,
            engagement_score: engagement,
            supplied_fields: 5,
            has_predictions: true,
        }
    }

    fn run(s: &NormalizedSignals, trust: f64) -> BidStrategy {
        classify(&RuleInput {
            signals: s,
            trust_score: trust,
            exclude_trust_below: 0.3,
        })
    }

    #[test]
    fn test_exclude_wins_over_everything() {
        assert_eq!(run(&signals(1.0, 1.0, 0.0, 1.0), 0.1), BidStrategy::Exclude);
    }

    #[test]
    fn test_aggressive_before_retention() {
        // Matches both the aggressive and the retention predicate
        let s = signals(0.8, 0.6, 0.9, 0.0);
        assert_eq!(run(&s, 0.9), BidStrategy::Aggressive);
    }

    #[test]
    fn test_retention() {
        assert_eq!(run(&signals(0.8, 0.2, 0.7, 0.0), 0.9), BidStrategy::Retention);
    }

    #[test]
    fn test_acquisition_before_nurture() {
        // Engaged newcomer with enough propensity to also be nurture
        let s = signals(0.2, 0.4, 0.1, 0.8);
        assert_eq!(run(&s, 0.9), BidStrategy::Acquisition);
    }

    #[test]
    fn test_nurture_and_conservative() {
        assert_eq!(run(&signals(0.5, 0.1, 0.1, 0.1), 0.9), BidStrategy::Nurture);
        assert_eq!(run(&signals(0.1, 0.1, 0.1, 0.1), 0.9), BidStrategy::Conservative);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(run(&signals(0.7, 0.5, 0.0, 0.0), 0.3), BidStrategy::Aggressive);
        assert_eq!(run(&signals(0.1, 0.3, 0.0, 0.0), 0.9), BidStrategy::Nurture);
    }

    #[test]
    fn test_rule_list_ends_with_catch_all() {
        let last = STRATEGY_RULES.last().unwrap();
        assert_eq!(last.strategy, BidStrategy::Conservative);
        assert_eq!(STRATEGY_RULES.len(), 6);
    }
}
