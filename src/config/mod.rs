//! Configuration management for the IP blocklist service.
//!
//! This module handles loading application configuration from an
//! optional configuration file and environment variables. Nested
//! settings use `__` in variable names, e.g. `WAF__ENDPOINT`.

use std::env;

use ::config::builder::DefaultState;
use ::config::{Config as Settings, ConfigBuilder, ConfigError, Environment, File};
use thiserror::Error;

use crate::models::Config;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Load configuration from the configuration file and environment variables
///
/// Detection settings are checked separately by `DetectionConfig::from_config`.
pub fn load_config() -> Result<Config, ConfigurationError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    build_config(
        Settings::builder()
            .add_source(File::with_name(&config_file).required(false))
            .add_source(Environment::default().separator("__")),
    )
}

fn build_config(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigurationError> {
    let config: Config = builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("log_columns.date", 0)?
        .set_default("log_columns.time", 1)?
        .set_default("log_columns.ip", 4)?
        .set_default("log_columns.status", 8)?
        .set_default("log_source.kind", "object_store")?
        .set_default("log_source.endpoint", "http://127.0.0.1:9000")?
        .set_default("log_source.root", "/var/lib/ip-blocklist/logs")?
        .set_default("log_source.request_timeout_seconds", 60)?
        .set_default("waf.endpoint", "https://waf.amazonaws.com/")?
        .set_default("waf.target_prefix", "AWSWAF_20150824")?
        .set_default("waf.max_update_attempts", 3)?
        .set_default("waf.request_timeout_seconds", 30)?
        .build()?
        .try_deserialize()?;

    if config.ip_set_id.trim().is_empty() {
        return Err(ConfigurationError::Invalid {
            key: "IP_SET_ID",
            reason: "must not be empty".to_string(),
        });
    }

    Ok(config)
}
