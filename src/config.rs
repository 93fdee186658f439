//! Configuration management
//!
//! The command-line tool reads `log-sink.toml` from the working directory
//! (or the path given with `--config`). Every section is optional.
//!
//! ```toml
//! [server]
//! url = "ws://127.0.0.1:8018"
//! user = "test"
//! password = "pass"
//!
//! [defaults]
//! relevance = "normal"
//! commit = "ab01"
//!
//! [query]
//! limit = 100
//! include_extra = false
//! ```

use crate::connection::Connection;
use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_QUERY_LIMIT, DEFAULT_SERVER_URL};
use crate::error::{Result, SinkError};
use crate::record::Relevance;
use crate::transport::PeerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// =============================================================================
// Sections
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub defaults: DefaultsConfig,
    pub query: QueryConfig,
}

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub user: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            user: String::new(),
            password: String::new(),
        }
    }
}

/// Values applied to records that do not set them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// `low`, `normal` or `high`
    pub relevance: String,
    /// Hex-encoded commit hash
    pub commit: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            relevance: "normal".to_string(),
            commit: None,
        }
    }
}

/// Defaults of the `query` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub limit: u32,
    pub include_extra: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            include_extra: false,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl Config {
    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| SinkError::ConfigValidation {
            field: "config",
            reason: e.to_string(),
        })?;
        config.relevance()?;
        config.commit()?;
        Ok(config)
    }

    pub fn relevance(&self) -> Result<Relevance> {
        self.defaults
            .relevance
            .parse()
            .map_err(|reason| SinkError::ConfigValidation {
                field: "defaults.relevance",
                reason,
            })
    }

    pub fn commit(&self) -> Result<Option<Vec<u8>>> {
        match &self.defaults.commit {
            None => Ok(None),
            Some(text) => hex::decode(text)
                .map(Some)
                .map_err(|e| SinkError::ConfigValidation {
                    field: "defaults.commit",
                    reason: format!("'{}' is not hex: {}", text, e),
                }),
        }
    }

    pub fn peer_options(&self) -> PeerOptions {
        PeerOptions::new(self.server.url.clone())
    }

    /// Set the connection's record defaults from the `[defaults]` section
    pub fn apply_defaults(&self, connection: &Connection) -> Result<()> {
        connection.set_default_relevance(self.relevance()?);
        connection.set_default_commit(self.commit()?);
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default config file path (in the working directory)
pub fn config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Load the config.
///
/// Without an explicit path, a missing default file yields the defaults.
/// An explicit path must exist.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };

    if !explicit && !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| SinkError::ConfigRead {
        path: path.clone(),
        source: e,
    })?;
    Config::parse(&content)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.server.user, "");
        assert_eq!(config.relevance().unwrap(), Relevance::Normal);
        assert_eq!(config.commit().unwrap(), None);
        assert_eq!(config.query.limit, 100);
        assert!(!config.query.include_extra);
    }

    #[test]
    fn test_config_empty_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_partial_server_section() {
        let config = Config::parse(
            r#"
[server]
user = "test"
password = "pass"

[defaults]
relevance = "high"
commit = "ab01"
"#,
        )
        .unwrap();

        assert_eq!(config.server.user, "test");
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.relevance().unwrap(), Relevance::High);
        assert_eq!(config.commit().unwrap(), Some(vec![0xab, 0x01]));
        assert_eq!(config.query.limit, 100);
    }

    #[test]
    fn test_config_invalid_values() {
        let err = Config::parse("[defaults]\nrelevance = \"loud\"").unwrap_err();
        assert!(matches!(
            err,
            SinkError::ConfigValidation {
                field: "defaults.relevance",
                ..
            }
        ));

        let err = Config::parse("[defaults]\ncommit = \"xyz\"").unwrap_err();
        assert!(matches!(
            err,
            SinkError::ConfigValidation {
                field: "defaults.commit",
                ..
            }
        ));

        assert!(Config::parse("[query]\nlimit = \"many\"").is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config {
            server: ServerConfig {
                url: "ws://logs.example:9000".to_string(),
                user: "ci".to_string(),
                password: "secret".to_string(),
            },
            defaults: DefaultsConfig {
                relevance: "low".to_string(),
                commit: Some("beef".to_string()),
            },
            query: QueryConfig {
                limit: 20,
                include_extra: true,
            },
        };

        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let path = std::env::temp_dir().join("log-sink-missing-config.toml");
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, SinkError::ConfigRead { .. }));
    }

    #[test]
    fn test_load_explicit_path() {
        let path = std::env::temp_dir().join(format!("log-sink-{}.toml", std::process::id()));
        fs::write(&path, "[query]\nlimit = 7\n").unwrap();

        let config = load(Some(&path)).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(config.query.limit, 7);
    }
}
