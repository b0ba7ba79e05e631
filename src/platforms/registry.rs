use std::sync::Arc;
use tracing::info;

use super::http::HttpPlatformAdapter;
use crate::common::errors::{GatewayError, Result};
use crate::common::traits::SharedPlatformAdapter;
use crate::common::types::PlatformId;
use crate::config::types::PlatformConfig;

/// The set of adapters the gateway dispatches to
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: Vec<SharedPlatformAdapter>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an HTTP adapter for every enabled platform
    ///
    /// An enabled platform without an endpoint is a configuration error.
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let mut registry = Self::new();
        for platform in config.enabled_platforms() {
            let endpoint = config.endpoints.get(&platform).ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "platform {} is enabled but platform.endpoints.{} is missing",
                    platform, platform
                ))
            })?;
            let adapter = HttpPlatformAdapter::new(platform, endpoint, config.timeout())?;
            registry = registry.with_adapter(Arc::new(adapter));
        }

        info!(platforms = ?registry.platforms(), "Platform adapters registered");
        Ok(registry)
    }

    /// Register an adapter, replacing any existing one for the same platform
    pub fn with_adapter(mut self, adapter: SharedPlatformAdapter) -> Self {
        self.adapters
            .retain(|existing| existing.platform() != adapter.platform());
        self.adapters.push(adapter);
        self.adapters
            .sort_by(|a, b| a.platform().cmp(b.platform()));
        self
    }

    pub fn platforms(&self) -> Vec<PlatformId> {
        self.adapters.iter().map(|a| a.platform().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn into_adapters(self) -> Vec<SharedPlatformAdapter> {
        self.adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::EndpointConfig;
    use std::collections::BTreeMap;

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            api_key: None,
            signing_secret: None,
        }
    }

    #[test]
    fn test_only_enabled_platforms_are_built() {
        let config = PlatformConfig {
            enabled: BTreeMap::from([
                (PlatformId::new("meta"), true),
                (PlatformId::new("google"), true),
                (PlatformId::new("tiktok"), false),
            ]),
            endpoints: BTreeMap::from([
                (PlatformId::new("google"), endpoint("http://localhost:9001/google")),
                (PlatformId::new("meta"), endpoint("http://localhost:9001/meta")),
                (PlatformId::new("tiktok"), endpoint("http://localhost:9001/tiktok")),
            ]),
            ..Default::default()
        };

        let registry = PlatformRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.platforms(),
            vec![PlatformId::new("google"), PlatformId::new("meta")]
        );
    }

    #[test]
    fn test_enabled_platform_without_endpoint_fails() {
        let config = PlatformConfig {
            enabled: BTreeMap::from([(PlatformId::new("google"), true)]),
            ..Default::default()
        };

        let err = PlatformRegistry::from_config(&config).err().unwrap();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn test_nothing_enabled_is_empty() {
        let registry = PlatformRegistry::from_config(&PlatformConfig::default()).unwrap();
        assert!(registry.is_empty());
    }
}
