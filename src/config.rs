//! Server configuration, read from `questlog.toml`

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    pub database_url: String,
    /// Root of the content tree (`quests/`, `scripts/quests/`)
    pub data_dir: PathBuf,
    /// Local hour (0-23) at which daily quests reset
    pub daily_reset_hour: u32,
    /// Default tracing directive, extended by `RUST_LOG`
    pub log_filter: String,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:questlog.db?mode=rwc".to_string(),
            data_dir: PathBuf::from("data"),
            daily_reset_hour: 4,
            log_filter: "questlog_server=info".to_string(),
        }
    }
}

impl QuestConfig {
    /// Load from `path`; a missing file means defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        if config.daily_reset_hour > 23 {
            warn!(
                "daily_reset_hour {} out of range, using 23",
                config.daily_reset_hour
            );
            config.daily_reset_hour = 23;
        }
        Ok(config)
    }
}
