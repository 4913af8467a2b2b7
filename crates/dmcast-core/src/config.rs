//! dmcast configuration system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DmCastError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmCastConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Slack API pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Minimum spacing between API calls, in milliseconds.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    /// Retries after the first failed attempt (total attempts = retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long a cached directory snapshot stays fresh.
    #[serde(default = "default_directory_ttl_secs")]
    pub directory_ttl_secs: u64,
}

fn default_rate_limit_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_directory_ttl_secs() -> u64 {
    300
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_retries: default_max_retries(),
            directory_ttl_secs: default_directory_ttl_secs(),
        }
    }
}

/// Upload limits for variable imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

/// Job registry retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Terminal jobs older than this are swept from the registry.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_retention_hours() -> u64 {
    24
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
        }
    }
}

impl DmCastConfig {
    /// Load config from the default path (~/.dmcast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DmCastError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DmCastError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DmCastError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dmcast")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DmCastConfig::default();
        assert_eq!(config.slack.rate_limit_delay_ms, 1000);
        assert_eq!(config.slack.max_retries, 3);
        assert_eq!(config.slack.directory_ttl_secs, 300);
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.jobs.retention_hours, 24);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: DmCastConfig = toml::from_str(
            r#"
            [slack]
            max_retries = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.slack.max_retries, 1);
        assert_eq!(config.slack.rate_limit_delay_ms, 1000);
        assert_eq!(config.jobs.retention_hours, 24);
    }
}
