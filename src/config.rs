//! Engine configuration, loaded from a TOML file with every field
//! defaulted so that `vex.toml` is entirely optional.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_max_node_id() -> u64 {
    4_000_000_000
}

fn default_max_way_id() -> u64 {
    400_000_000
}

fn default_max_node_refs() -> u64 {
    4_000_000_000
}

fn default_lock_path() -> String {
    "/tmp/vex.lock".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capacity {
    #[serde(default = "default_max_node_id")]
    pub max_node_id: u64,
    #[serde(default = "default_max_way_id")]
    pub max_way_id: u64,
    #[serde(default = "default_max_node_refs")]
    pub max_node_refs: u64,
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity {
            max_node_id: default_max_node_id(),
            max_way_id: default_max_way_id(),
            max_node_refs: default_max_node_refs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    /// Print the grid fill-factor report after a load completes.
    #[serde(default = "default_true")]
    pub report_fill_factor: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime {
            lock_path: default_lock_path(),
            report_fill_factor: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub capacity: Capacity,
    #[serde(default)]
    pub runtime: Runtime,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = Config::from_file("/nonexistent/vex.toml").unwrap();
        assert_eq!(config.capacity.max_node_id, default_max_node_id());
    }

    #[test]
    fn parses_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vex.toml");
        std::fs::write(&path, "[capacity]\nmax_way_id = 1000\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.capacity.max_way_id, 1000);
        assert_eq!(config.capacity.max_node_id, default_max_node_id());
    }
}
