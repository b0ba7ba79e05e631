//! Gateway configuration: types, defaults, loading and validation

pub mod loader;
pub mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{
    AnalyticsConfig, AppConfig, AppSettings, BidConfig, ChallengePolicy, DatabaseConfig,
    EndpointConfig, PlatformConfig, RateLimitConfig, TrustConfig,
};
