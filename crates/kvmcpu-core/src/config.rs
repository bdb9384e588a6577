//! Collector configuration.
//!
//! The host loads one `Config` at startup and hands it to every collector
//! factory. Collectors keep it as-is; only `kmem_gid` is interpreted here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Group id that owns `/dev/mem` and `/dev/kmem` on a stock FreeBSD install.
pub const DEFAULT_KMEM_GID: u32 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Io { path: PathBuf, error: std::io::Error },
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

/// Configuration forwarded unchanged from the host to each collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Free-form collector attributes.
    pub attributes: HashMap<String, String>,
    /// Group whose members may read kernel memory.
    pub kmem_gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attributes: HashMap::new(),
            kmem_gid: DEFAULT_KMEM_GID,
        }
    }
}

impl Config {
    /// Parses a JSON document. Missing keys take their defaults.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.attributes.is_empty());
        assert_eq!(config.kmem_gid, DEFAULT_KMEM_GID);
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"attributes": {"region": "eu"}}"#).unwrap();
        assert_eq!(config.attributes.get("region").map(String::as_str), Some("eu"));
        assert_eq!(config.kmem_gid, DEFAULT_KMEM_GID);
    }

    #[test]
    fn test_from_json_kmem_gid() {
        let config = Config::from_json(r#"{"kmem_gid": 5}"#).unwrap();
        assert_eq!(config.kmem_gid, 5);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"attributes": {{"host": "db1"}}, "kmem_gid": 2}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.attributes.get("host").map(String::as_str), Some("db1"));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = Config::from_file(&path).unwrap_err();
        match err {
            ConfigError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
