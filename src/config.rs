use std::path::PathBuf;
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

/// Public tikwm endpoint; expects the target URL appended, URL-encoded
pub const DEFAULT_ENDPOINT: &str = "https://www.tikwm.com/api/?url=";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: Option<String>,
    pub proxy: Option<String>,
    pub use_proxy: Option<bool>,
    pub download_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

/// Everything the upstream client needs for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Relay prefix; the full request URL is appended, URL-encoded
    pub proxy: Option<String>,
    /// None means wait indefinitely
    pub timeout: Option<Duration>,
    pub attempts: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proxy: None,
            timeout: None,
            attempts: 1,
        }
    }
}

impl Config {
    /// Load config from ~/.config/vidgrab/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Resolve the upstream client settings, filling gaps with defaults.
    ///
    /// A configured proxy is only used when `use_proxy` is not explicitly false.
    pub fn api_config(&self) -> ApiConfig {
        let defaults = ApiConfig::default();
        let proxy = match self.use_proxy {
            Some(false) => None,
            _ => self.proxy.clone().filter(|p| !p.trim().is_empty()),
        };

        ApiConfig {
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            proxy,
            timeout: self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            attempts: self.retries.unwrap_or(defaults.attempts).max(1),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("vidgrab")
        .join("config.toml")
}
