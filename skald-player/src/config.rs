//! Configuration for the player service
//!
//! Minimal TOML bootstrap: database path, bind port, artwork cache
//! directory and log filter. Anything that changes at runtime lives in
//! the database, not here; the file cannot change while running.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Bootstrap configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for cached per-album artwork JPEGs.
    #[serde(default = "default_art_cache_dir")]
    pub art_cache_dir: PathBuf,

    /// Default tracing filter, overridable via RUST_LOG.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("skald.db")
}

fn default_port() -> u16 {
    5790
}

fn default_art_cache_dir() -> PathBuf {
    PathBuf::from("art-cache")
}

fn default_log_filter() -> String {
    "skald_player=debug,skald_common=debug,tower_http=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            art_cache_dir: default_art_cache_dir(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to built-in
    /// defaults when no path is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 5790);
        assert_eq!(config.database_path, PathBuf::from("skald.db"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/skald.toml"))).unwrap();
        assert_eq!(config.port, 5790);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skald.toml");
        std::fs::write(&path, "port = 6001\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 6001);
        // Unspecified keys keep their defaults.
        assert_eq!(config.database_path, PathBuf::from("skald.db"));
    }
}
