//! Daemon configuration (`<root>/config.json`).
//!
//! The config file is created with defaults on first run and read back
//! verbatim afterwards. It controls the buildpack builder image and
//! whether uploaded archives are gzip-compressed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Archive compression settings negotiated between CLI and daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    pub enabled: bool,
    pub level: u8,
}

/// Daemon-wide configuration, persisted at `<root>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Buildpack builder image reference handed to `pack build`.
    pub builder: String,
    pub compression: Compression,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            builder: "paketobuildpacks/builder-jammy-tiny".to_string(),
            compression: Compression {
                enabled: false,
                level: 0,
            },
        }
    }
}

/// Payload of `GET /heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub compression: Compression,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write config file: {0}")]
    Write(#[source] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DaemonConfig {
    /// Load the config from `<root>/config.json`, writing the default
    /// config there first if no file exists yet.
    pub fn load_or_init(root_dir: &Path) -> Result<Self, ConfigError> {
        let path = root_dir.join("config.json");
        if !path.exists() {
            let config = Self::default();
            let bytes = serde_json::to_vec_pretty(&config)?;
            std::fs::write(&path, bytes).map_err(ConfigError::Write)?;
            return Ok(config);
        }

        let bytes = std::fs::read(&path).map_err(ConfigError::Read)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
