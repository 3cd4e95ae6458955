//! Configuration for the Transfer Monitor
//!
//! Layered as defaults → optional TOML file → `ARKHAM_*` environment
//! variables (`ARKHAM_API_KEY`, `ARKHAM_API_BASE_URL`, ...).

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Production API endpoint
pub const BASE_API_URL: &str = "https://api.arkhamintelligence.com";

/// Config file consulted when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/transfer_monitor.toml";

/// Placeholder shipped in sample env files
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// API key sent as the `API-Key` header
    pub api_key: Option<String>,

    /// Base URL of the intelligence API
    pub api_base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Default polling interval in seconds
    pub poll_interval_secs: u64,

    /// `limit` query parameter for fetches
    pub default_limit: u32,

    /// Apply resolved filters locally after each fetch
    pub client_side_filtering: bool,

    /// Extra token synonyms (alias → canonical symbol)
    pub token_synonyms: HashMap<String, String>,

    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: BASE_API_URL.to_string(),
            request_timeout_secs: 60,
            poll_interval_secs: 60,
            default_limit: 100,
            client_side_filtering: false,
            token_synonyms: HashMap::new(),
            log_level: "warn".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
        debug!("Loading monitor config from {:?}", file);

        let config = Config::builder()
            .add_source(File::from(file).required(path.is_some()))
            .add_source(Environment::with_prefix("ARKHAM").try_parsing(true))
            .build()
            .context("Failed to build configuration")?;

        let config: MonitorConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        info!(
            "Monitor config loaded: base_url={}, interval={}s, limit={}",
            config.api_base_url, config.poll_interval_secs, config.default_limit
        );
        Ok(config)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// API key, if one is configured and is not the placeholder
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }
}
