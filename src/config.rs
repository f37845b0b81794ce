//! Configuration management for bestllm
//!
//! Config file location:
//! - Linux: ~/.config/bestllm/config.toml
//! - macOS: ~/Library/Application Support/bestllm/config.toml
//! - Windows: %APPDATA%/bestllm/config.toml
//!
//! You can override the config location by setting `BESTLLM_CONFIG_PATH`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{self, ModelProfile};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Catalog source settings
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to a custom catalog TOML file; the built-in catalog is used
    /// when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("BESTLLM_CONFIG_PATH") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs = ProjectDirs::from("com", "bestllm", "bestllm")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Resolve the model catalog: the custom file when configured,
    /// otherwise the built-in profiles.
    pub fn model_profiles(&self) -> Result<Vec<ModelProfile>> {
        match &self.catalog.path {
            Some(path) => catalog::load_from_file(path),
            None => Ok(catalog::default_profiles()),
        }
    }
}
