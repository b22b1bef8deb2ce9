//! Application configuration management.
//!
//! This module handles loading and saving application-wide defaults (I/O
//! thread count) and resolving the platform-specific default index location.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_io_threads() -> usize {
    4
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default number of hashing I/O threads.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: default_io_threads(),
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    ///
    /// Falls back to defaults when the file is absent or unreadable; a
    /// broken config file must not prevent the tool from running.
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default platform-specific configuration path.
    fn config_path() -> Result<PathBuf> {
        let project_dirs = project_dirs()?;
        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Get the default platform-specific index database path.
    pub fn default_index_path() -> Result<PathBuf> {
        let project_dirs = project_dirs()?;
        Ok(project_dirs.data_dir().join("index.db"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "movedupe", "movedupe")
        .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
}
