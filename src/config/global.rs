//! Global configuration for toolup.
//!
//! The global file lives at `~/.toolup/config.toml` (or
//! `%LOCALAPPDATA%\toolup\config.toml` on Windows). The `TOOLUP_CONFIG`
//! environment variable and the `--config` flag point elsewhere. A missing file
//! is not an error; every setting has a default.
//!
//! ```toml
//! [upgrade]
//! descriptor_url = "https://updates.example.com/toolup.json"
//! retention_days = 7
//! ```

use crate::upgrade::config::UpdaterConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "TOOLUP_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Settings for the self-update pipeline.
    #[serde(default)]
    pub upgrade: UpdaterConfig,
}

impl GlobalConfig {
    /// Load from `path` if given, otherwise from [`Self::default_path`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("toolup")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".toolup")
        };

        Ok(config_dir.join("config.toml"))
    }
}
