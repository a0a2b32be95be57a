//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: KBASE_, nesting separator: `__`)
//! 2. Current working directory: ./kbase.toml
//! 3. XDG config directory: ~/.config/kbase/config.toml
//! 4. System directory: /etc/kbase/config.toml
//! 5. Default values
//!
//! ```toml
//! [storage]
//! backend = "libsql"
//! url = "knowledge.db"
//!
//! [repository]
//! operation_timeout_ms = 5000
//! tag_separator = "::"
//!
//! [logging]
//! level = "kbase=debug,info"
//! json = true
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::tag::DEFAULT_SEPARATOR;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which storage driver serves the repositories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// libsql: SQLite files, `:memory:` or remote libsql servers
    #[default]
    Libsql,
    /// sqlx: PostgreSQL or MySQL
    Sqlx,
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// File path, `:memory:`, or a database URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Auth token for remote libsql servers
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Pool size for the sqlx backend
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: default_url(),
            auth_token: None,
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

/// Settings shared by every repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Upper bound on a single repository call, unbounded when absent
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,

    /// Separator between tag name components
    #[serde(default = "default_tag_separator")]
    pub tag_separator: String,
}

impl RepositoryConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: None,
            tag_separator: default_tag_separator(),
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `kbase=debug,warn`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_true(),
        }
    }
}

fn default_url() -> String {
    "kbase.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_tag_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

const ENV_PREFIX: &str = "KBASE_";

impl Config {
    /// Load configuration from every standard location
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the standard locations; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("kbase.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("kbase");
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/kbase/config.toml"));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::Libsql);
        assert_eq!(config.storage.url, "kbase.db");
        assert_eq!(config.repository.tag_separator, "::");
        assert_eq!(config.repository.operation_timeout(), None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[storage]\nbackend = \"sqlx\"\nurl = \"postgres://localhost/kb\"\n\n\
             [repository]\noperation_timeout_ms = 250\ntag_separator = \"/\""
        )
        .expect("write config");

        let config = Config::load_from(file.path()).expect("config loads");
        assert_eq!(config.storage.backend, BackendKind::Sqlx);
        assert_eq!(config.storage.url, "postgres://localhost/kb");
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(
            config.repository.operation_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.repository.tag_separator, "/");
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_from("/nonexistent/kbase.toml").expect("defaults");
        assert_eq!(config.storage.url, "kbase.db");
    }
}
