use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::MAX_SESSION_MESSAGES;

fn default_api_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_max_query_length() -> usize {
    1000
}

fn default_max_history_size() -> usize {
    50
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Widget configuration: API endpoint, limits, and feature toggles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WidgetConfig {
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub show_sources: bool,
    #[serde(default = "default_true")]
    pub enable_selected_text: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        WidgetConfig {
            api_endpoint: default_api_endpoint(),
            max_query_length: default_max_query_length(),
            max_history_size: default_max_history_size(),
            timeout_ms: default_timeout_ms(),
            show_sources: true,
            enable_selected_text: true,
        }
    }
}

impl WidgetConfig {
    /// Load configuration from `config.toml`, falling back to defaults when
    /// the file is absent or unparsable, then apply environment overrides and
    /// validate the result.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("error parsing config.toml: {}. Using defaults.", e);
                        WidgetConfig::default()
                    }
                },
                Err(e) => {
                    warn!("error reading config.toml: {}. Using defaults.", e);
                    WidgetConfig::default()
                }
            }
        } else {
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            WidgetConfig::default()
        };

        if let Ok(endpoint) = std::env::var("BOOKBOT_API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }
        if let Ok(timeout) = std::env::var("BOOKBOT_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.timeout_ms = ms,
                Err(_) => warn!("ignoring unparsable BOOKBOT_TIMEOUT_MS: {}", timeout),
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api_endpoint)
            .map_err(|_| Error::Validation("API endpoint must be a valid URL".into()))?;
        if self.max_query_length == 0 {
            return Err(Error::Validation(
                "Max query length must be a positive number".into(),
            ));
        }
        if !(1..=MAX_SESSION_MESSAGES).contains(&self.max_history_size) {
            return Err(Error::Validation(format!(
                "Max history size must be between 1 and {}",
                MAX_SESSION_MESSAGES
            )));
        }
        if !(1000..=30_000).contains(&self.timeout_ms) {
            return Err(Error::Validation(
                "Timeout must be between 1000 and 30000 milliseconds".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/bookbot")
        } else {
            PathBuf::from(".")
        }
    }
}
