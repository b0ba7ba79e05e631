//! Configuration loader

use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::{debug, warn};

use super::types::AppConfig;
use crate::common::errors::{GatewayError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with GATEWAY_, sections split by `__`)
/// 2. Configuration file (TOML format)
/// 3. Default values
///
/// The result is validated before it is returned.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Pick up a local .env file if present
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            debug!("Loading configuration file {}", path);
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            warn!("Configuration file {} not found, using defaults", path);
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("GATEWAY")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    finish(builder)
}

/// Load configuration from an in-memory TOML document
pub fn load_config_from_str(toml: &str) -> Result<AppConfig> {
    let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
    finish(builder)
}

fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<AppConfig> {
    let config = builder
        .build()
        .map_err(|e| GatewayError::Configuration(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| GatewayError::Configuration(e.to_string()))?;

    app.validate()?;
    Ok(app)
}
