//! Configuration module for gifloader

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sizer;

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Cache capacity in bytes (unset = derived from available memory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size_bytes: Option<usize>,

    /// Wait after the first completed fetch before delivering the batch (0 = no batching)
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with image requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_batch_delay() -> u64 {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("gifloader/{}", crate::VERSION)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size_bytes: None,
            batch_delay_ms: default_batch_delay(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("gifloader");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Cache capacity to use: the configured size, or the memory-derived budget
    pub fn cache_capacity(&self) -> usize {
        self.cache_size_bytes.unwrap_or_else(sizer::default_cache_budget)
    }
}
