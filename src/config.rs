//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on concurrent chunk fetch workers per query
    #[serde(default = "default_fetch_parallelism")]
    pub max_chunk_fetch_parallelism: usize,

    /// Timeout applied to each table's index queries; 0 disables it
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_fetch_parallelism() -> usize {
    150
}

fn default_query_timeout() -> u64 {
    120 // 2 minutes
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_chunk_fetch_parallelism: default_fetch_parallelism(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl QueryConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        match self.query_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Local store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite index database
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Root directory of the filesystem chunk store
    #[serde(default = "default_chunk_dir")]
    pub chunk_dir: String,

    /// Entries per read batch returned by the index store
    #[serde(default = "default_index_page_size")]
    pub index_page_size: usize,
}

fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("logstore"))
        .unwrap_or_else(|| PathBuf::from("./logstore_data"))
}

fn default_index_path() -> String {
    default_data_root()
        .join("index.db")
        .to_string_lossy()
        .to_string()
}

fn default_chunk_dir() -> String {
    default_data_root()
        .join("chunks")
        .to_string_lossy()
        .to_string()
}

fn default_index_page_size() -> usize {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            chunk_dir: default_chunk_dir(),
            index_page_size: default_index_page_size(),
        }
    }
}

impl StorageConfig {
    /// Index database path with a leading `~` expanded
    pub fn index_path(&self) -> PathBuf {
        expand_home(&self.index_path)
    }

    /// Chunk directory with a leading `~` expanded
    pub fn chunk_dir(&self) -> PathBuf {
        expand_home(&self.chunk_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("logstore").join("config.toml")),
            Some(PathBuf::from("/etc/logstore/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config");
                    }
                }
            }
        }

        tracing::info!("using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(path) = var("LOGSTORE_INDEX_PATH") {
            self.storage.index_path = path;
        }
        if let Some(dir) = var("LOGSTORE_CHUNK_DIR") {
            self.storage.chunk_dir = dir;
        }

        // Query overrides
        if let Some(parallelism) = var("LOGSTORE_FETCH_PARALLELISM") {
            match parallelism.parse() {
                Ok(n) => self.query.max_chunk_fetch_parallelism = n,
                Err(_) => tracing::warn!(value = %parallelism, "ignoring invalid LOGSTORE_FETCH_PARALLELISM"),
            }
        }

        // Logging overrides
        if let Some(level) = var("LOGSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOGSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# logstore Configuration
#
# Environment variables override these settings:
# - LOGSTORE_INDEX_PATH
# - LOGSTORE_CHUNK_DIR
# - LOGSTORE_FETCH_PARALLELISM
# - LOGSTORE_LOG_LEVEL
# - LOGSTORE_LOG_FORMAT

[query]
# Maximum concurrent chunk fetch workers per query
max_chunk_fetch_parallelism = 150

# Timeout for each table's index queries in seconds (0 disables)
query_timeout_secs = 120

[storage]
# SQLite index database
index_path = "~/.local/share/logstore/index.db"

# Directory holding chunk files
chunk_dir = "~/.local/share/logstore/chunks"

# Index entries per read batch
index_page_size = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty, json
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.query.max_chunk_fetch_parallelism, 150);
        assert_eq!(config.query.query_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.storage.index_page_size, 1000);
        assert!(config.storage.index_path.ends_with("index.db"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [query]
            max_chunk_fetch_parallelism = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.query.max_chunk_fetch_parallelism, 8);
        assert_eq!(config.query.query_timeout_secs, 120);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.query.max_chunk_fetch_parallelism, 150);
        assert_eq!(config.storage.index_page_size, 1000);
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[query\nmax_chunk_fetch_parallelism = ").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOGSTORE_INDEX_PATH", "/tmp/idx.db"),
            ("LOGSTORE_CHUNK_DIR", "/tmp/chunks"),
            ("LOGSTORE_FETCH_PARALLELISM", "12"),
            ("LOGSTORE_LOG_FORMAT", "json"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.index_path, "/tmp/idx.db");
        assert_eq!(config.storage.chunk_dir, "/tmp/chunks");
        assert_eq!(config.query.max_chunk_fetch_parallelism, 12);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_parallelism_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "LOGSTORE_FETCH_PARALLELISM").then(|| "lots".to_string()));
        assert_eq!(config.query.max_chunk_fetch_parallelism, 150);
    }

    #[test]
    fn test_home_expansion() {
        let config = StorageConfig {
            index_path: "~/logstore/index.db".to_string(),
            chunk_dir: "/var/lib/logstore/chunks".to_string(),
            ..Default::default()
        };

        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.index_path(), home.join("logstore/index.db"));
        }
        assert_eq!(config.chunk_dir(), PathBuf::from("/var/lib/logstore/chunks"));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = QueryConfig {
            query_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.query_timeout(), None);
    }
}
