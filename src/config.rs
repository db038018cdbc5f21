use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use crate::error::{StoreError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP API configuration (optional).
    #[serde(default)]
    pub api: ApiConfig,
}

/// HTTP API configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Whether `serve` starts the HTTP API.
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    /// Port to listen on.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: default_api_enabled(), port: default_api_port() }
    }
}

fn default_api_enabled() -> bool { true }
fn default_api_port() -> u16 { 8080 }

/// Storage parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the index database and the blob directory.
    pub base_path: PathBuf,
    /// Age after which a file is eligible for garbage collection.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Run garbage collection and reconciliation when `serve` starts.
    #[serde(default = "default_gc_on_startup")]
    pub gc_on_startup: bool,
}

impl StorageConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_ttl_secs() -> u64 { 24 * 60 * 60 }
fn default_gc_on_startup() -> bool { true }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(StoreError::Config("base_path must not be empty".into()));
        }
        if self.storage.ttl_secs == 0 {
            return Err(StoreError::Config("ttl_secs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_toml("[storage]\nbase_path = \"/tmp/ts\"\n").unwrap();
        assert_eq!(cfg.storage.ttl(), Duration::from_secs(86_400));
        assert!(cfg.storage.gc_on_startup);
        assert!(cfg.api.enabled);
        assert_eq!(cfg.api.port, 8080);
    }

    #[test]
    fn explicit_values() {
        let cfg = Config::from_toml(
            r#"
            [storage]
            base_path = "/var/tmp/ts"
            ttl_secs = 3600
            gc_on_startup = false

            [api]
            enabled = false
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.base_path, PathBuf::from("/var/tmp/ts"));
        assert_eq!(cfg.storage.ttl_secs, 3600);
        assert!(!cfg.storage.gc_on_startup);
        assert!(!cfg.api.enabled);
        assert_eq!(cfg.api.port, 9000);
    }

    #[test]
    fn rejects_zero_ttl() {
        let err = Config::from_toml("[storage]\nbase_path = \"/tmp/ts\"\nttl_secs = 0\n").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn rejects_missing_storage() {
        assert!(matches!(Config::from_toml(""), Err(StoreError::Config(_))));
    }
}
