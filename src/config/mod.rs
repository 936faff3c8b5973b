//! Configuration module for pipeport
//!
//! A process reads one [`AppConfig`] at startup and hands it to its
//! [`ProcessContext`](crate::context::ProcessContext).
//!
//! # File formats
//!
//! Configuration files are TOML. Files ending in `.json` are read and
//! written as JSON instead. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! # Example
//!
//! ```toml
//! [channel]
//! receive_timeout_ms = 5000
//!
//! [logging]
//! filter = "info,pipeport=trace"
//!
//! [protocol]
//! base_tag = 200
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{PortError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.pipeport";

/// Config filename inside the platform config directory
pub const CONFIG_FILE: &str = "pipeport.toml";

/// Complete configuration of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Default location: `<platform config dir>/dev.pipeport/pipeport.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PortError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PortError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                PortError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            Self::from_toml_str(&content)
                .map_err(|e| e.with_context(format!("Loading {:?}", path)))
        }
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save the configuration to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PortError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| PortError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| PortError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            PortError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
