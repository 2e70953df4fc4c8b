//! Configuration management for augury.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (AUGURY_CONFIG, AUGURY_DATABASE_PATH, AUGURY_REDIS_URL)
//! 2. Config file (augury.toml in the platform config dir)
//! 3. Default values

use anyhow::{Context, Result};
use augury_sdk::EngineConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "augury.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Memory engine tuning (`[scoring]`, `[retrieval]`, `[cache]`, `[session]`, `[llm]`)
    #[serde(flatten)]
    pub engine: EngineConfig,

    /// Paths
    pub paths: PathsConfig,

    /// Shared Redis for the hot cache
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for augury data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite database (default: `<data_dir>/augury.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://host:port/db`; the in-process cache is used when unset
    pub url: Option<String>,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "augury", "augury") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".augury")
    }
}

fn default_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "augury", "augury") {
        proj_dirs.config_dir().join(CONFIG_FILE)
    } else {
        default_data_dir().join(CONFIG_FILE)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("AUGURY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config
            .engine
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os("AUGURY_DATABASE_PATH") {
            self.paths.database_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("AUGURY_REDIS_URL") {
            if !url.trim().is_empty() {
                self.redis.url = Some(url);
            }
        }
    }

    /// Resolved SQLite path
    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database_path
            .clone()
            .unwrap_or_else(|| self.paths.data_dir.join("augury.db"))
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
