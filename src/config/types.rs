//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::bidding::BidStrategy;
use crate::common::errors::{GatewayError, Result};
use crate::common::retry::RetryPolicy;
use crate::common::types::PlatformId;

/// Main application configuration
///
/// Loaded once at startup and read-only while events are handled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Trust scoring thresholds
    #[serde(default)]
    pub trust: TrustConfig,
    /// Bid decisioning bounds and per-platform tuning
    #[serde(default)]
    pub bid: BidConfig,
    /// Platform enablement, endpoints and call timeout
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Analytics sink settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    /// Per-subject event rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Database configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Reject inconsistent values before serving traffic
    pub fn validate(&self) -> Result<()> {
        self.trust.validate()?;
        self.bid.validate()?;
        self.platform.validate()?;

        if self.analytics.timeout_ms == 0 {
            return Err(GatewayError::Configuration(
                "analytics.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.max_events == 0 || self.rate_limit.window_seconds == 0)
        {
            return Err(GatewayError::Configuration(
                "rate_limit.max_events and rate_limit.window_seconds must be positive".to_string(),
            ));
        }
        if self.settings.max_in_flight == 0 {
            return Err(GatewayError::Configuration(
                "settings.max_in_flight must be greater than zero".to_string(),
            ));
        }
        if let Some(db) = &self.database {
            url::Url::parse(&db.url).map_err(|e| {
                GatewayError::Configuration(format!("database.url is not a valid URL: {}", e))
            })?;
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GatewayError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// What to do with events whose trust action is `challenge`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengePolicy {
    /// Dispatch to platforms exactly like `allow`
    #[default]
    Dispatch,
    /// Record in analytics only, like `block`
    Hold,
}

/// Trust scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Scores below this are blocked
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,
    /// Scores below this (and at or above the block threshold) are challenged
    #[serde(default = "default_challenge_threshold")]
    pub challenge_threshold: f64,
    /// Dispatch policy for challenged events
    #[serde(default)]
    pub challenge_policy: ChallengePolicy,
    /// Score deducted when the rate-limit counter is exceeded
    #[serde(default = "default_rate_limit_penalty")]
    pub rate_limit_penalty: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            challenge_threshold: default_challenge_threshold(),
            challenge_policy: ChallengePolicy::default(),
            rate_limit_penalty: default_rate_limit_penalty(),
        }
    }
}

impl TrustConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("trust.block_threshold", self.block_threshold)?;
        check_unit_interval("trust.challenge_threshold", self.challenge_threshold)?;
        check_unit_interval("trust.rate_limit_penalty", self.rate_limit_penalty)?;
        if self.block_threshold > self.challenge_threshold {
            return Err(GatewayError::Configuration(format!(
                "trust.block_threshold ({}) exceeds trust.challenge_threshold ({})",
                self.block_threshold, self.challenge_threshold
            )));
        }
        Ok(())
    }
}

fn default_block_threshold() -> f64 {
    0.3
}

fn default_challenge_threshold() -> f64 {
    0.6
}

fn default_rate_limit_penalty() -> f64 {
    0.3
}

/// Bid decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidConfig {
    /// Global lower bound for the spend multiplier
    #[serde(default = "default_min_multiplier")]
    pub min_multiplier: f64,
    /// Global upper bound for the spend multiplier
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    /// Trust scores below this are excluded from spend
    #[serde(default = "default_exclude_trust_below")]
    pub exclude_trust_below: f64,
    /// Per-platform factor applied to the base multiplier (missing = 1.0)
    #[serde(default = "default_platform_adjustments")]
    pub platform_adjustments: BTreeMap<PlatformId, f64>,
    /// Audience labels overriding the built-in strategy × platform table
    #[serde(default)]
    pub audience_overrides: BTreeMap<PlatformId, BTreeMap<BidStrategy, String>>,
    /// Signals older than this many hours discount confidence (0 = never)
    #[serde(default)]
    pub signal_max_age_hours: u64,
    /// Confidence factor applied to stale signals
    #[serde(default = "default_stale_confidence_factor")]
    pub stale_confidence_factor: f64,
}

impl Default for BidConfig {
    fn default() -> Self {
        Self {
            min_multiplier: default_min_multiplier(),
            max_multiplier: default_max_multiplier(),
            exclude_trust_below: default_exclude_trust_below(),
            platform_adjustments: default_platform_adjustments(),
            audience_overrides: BTreeMap::new(),
            signal_max_age_hours: 0,
            stale_confidence_factor: default_stale_confidence_factor(),
        }
    }
}

impl BidConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_multiplier.is_finite() || self.min_multiplier < 0.0 {
            return Err(GatewayError::Configuration(format!(
                "bid.min_multiplier must be non-negative, got {}",
                self.min_multiplier
            )));
        }
        if !self.max_multiplier.is_finite() || self.min_multiplier > self.max_multiplier {
            return Err(GatewayError::Configuration(format!(
                "bid.min_multiplier ({}) exceeds bid.max_multiplier ({})",
                self.min_multiplier, self.max_multiplier
            )));
        }
        check_unit_interval("bid.exclude_trust_below", self.exclude_trust_below)?;
        check_unit_interval("bid.stale_confidence_factor", self.stale_confidence_factor)?;
        for (platform, factor) in &self.platform_adjustments {
            if !factor.is_finite() || *factor <= 0.0 {
                return Err(GatewayError::Configuration(format!(
                    "bid.platform_adjustments.{} must be positive, got {}",
                    platform, factor
                )));
            }
        }
        Ok(())
    }

    /// Adjustment factor for a platform
    pub fn adjustment_for(&self, platform: &PlatformId) -> f64 {
        self.platform_adjustments
            .get(platform)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn signal_max_age(&self) -> Option<chrono::Duration> {
        if self.signal_max_age_hours == 0 {
            None
        } else {
            i64::try_from(self.signal_max_age_hours)
                .ok()
                .map(chrono::Duration::hours)
        }
    }
}

fn default_min_multiplier() -> f64 {
    0.5
}

fn default_max_multiplier() -> f64 {
    2.0
}

fn default_exclude_trust_below() -> f64 {
    0.3
}

fn default_stale_confidence_factor() -> f64 {
    0.5
}

fn default_platform_adjustments() -> BTreeMap<PlatformId, f64> {
    BTreeMap::from([
        (PlatformId::new("google"), 1.05),
        (PlatformId::new("meta"), 1.0),
        (PlatformId::new("tiktok"), 0.95),
    ])
}

/// Delivery endpoint for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// URL the event envelope is POSTed to
    pub url: String,
    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    /// Optional base64 HMAC secret for payload signatures
    #[serde(default)]
    pub signing_secret: Option<String>,
}

/// Downstream platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Timeout for a single platform call in milliseconds
    #[serde(default = "default_platform_timeout")]
    pub timeout_ms: u64,
    /// Enablement flag per platform
    #[serde(default)]
    pub enabled: BTreeMap<PlatformId, bool>,
    /// Delivery endpoint per platform
    #[serde(default)]
    pub endpoints: BTreeMap<PlatformId, EndpointConfig>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_platform_timeout(),
            enabled: BTreeMap::new(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl PlatformConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(GatewayError::Configuration(
                "platform.timeout_ms must be greater than zero".to_string(),
            ));
        }
        for (platform, endpoint) in &self.endpoints {
            url::Url::parse(&endpoint.url).map_err(|e| {
                GatewayError::Configuration(format!(
                    "platform.endpoints.{}.url is not a valid URL: {}",
                    platform, e
                ))
            })?;
        }
        Ok(())
    }

    /// Platforms flagged as enabled, in stable order
    pub fn enabled_platforms(&self) -> Vec<PlatformId> {
        self.enabled
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(platform, _)| platform.clone())
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_platform_timeout() -> u64 {
    2000
}

/// Analytics sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Timeout for one analytics append in milliseconds
    #[serde(default = "default_analytics_timeout")]
    pub timeout_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_analytics_timeout(),
        }
    }
}

impl AnalyticsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_analytics_timeout() -> u64 {
    5000
}

/// Event rate limiting keyed by subject or client IP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Events allowed per window before the trust penalty applies
    #[serde(default = "default_rate_limit_max_events")]
    pub max_events: u64,
    /// Counter window in seconds
    #[serde(default = "default_rate_limit_window")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_events: default_rate_limit_max_events(),
            window_seconds: default_rate_limit_window(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

fn default_rate_limit_max_events() -> u64 {
    120
}

fn default_rate_limit_window() -> u64 {
    60
}

/// Database configuration for analytics, predictions and rate limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of events handled concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Attempts per event when the analytics write fails
    #[serde(default = "default_retry_attempts")]
    pub persistence_retry_attempts: u32,
    /// Base backoff delay between persistence retries in milliseconds
    #[serde(default = "default_retry_base")]
    pub persistence_retry_base_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_in_flight: default_max_in_flight(),
            persistence_retry_attempts: default_retry_attempts(),
            persistence_retry_base_ms: default_retry_base(),
        }
    }
}

impl AppSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.persistence_retry_attempts,
            Duration::from_millis(self.persistence_retry_base_ms),
        )
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base() -> u64 {
    200
}
