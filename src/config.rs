//! Runtime configuration (spec.md §6-FULL ambient interfaces).
//!
//! Loaded from a JSON file via `serde_json`, with defaults matching a
//! reasonable single-device desktop setup so the CLI works out of the box
//! with no config file present.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_command_timeout_ms() -> u64 {
    5_000
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_worker_count() -> usize {
    2
}

/// Persisted configuration for the CLI and any other host process driving
/// a [`crate::session::Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JensenConfig {
    /// Preferred serial number to connect to, if more than one device is
    /// attached. `None` connects to the first recognized device found.
    #[serde(default)]
    pub device_serial: Option<String>,

    /// Overall deadline for a single non-streaming command, in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Directory downloaded files are written into.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Number of concurrent operations-manager workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for JensenConfig {
    fn default() -> JensenConfig {
        JensenConfig {
            device_serial: None,
            command_timeout_ms: default_command_timeout_ms(),
            download_dir: default_download_dir(),
            worker_count: default_worker_count(),
        }
    }
}

impl JensenConfig {
    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<JensenConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(JensenConfig::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: JensenConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.worker_count >= 1, "worker_count must be >= 1");
        anyhow::ensure!(self.command_timeout_ms >= 100, "command_timeout_ms must be >= 100");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = JensenConfig::load_or_default("/nonexistent/path/jensen.json").unwrap();
        assert_eq!(config.worker_count, default_worker_count());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = JensenConfig {
            worker_count: 0,
            ..JensenConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
