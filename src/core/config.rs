//! Configuration management for SCMS
//!
//! Settings come from a TOML file, then `SCMS_*` environment variables, then
//! command-line flags (applied by the binary). Every section has defaults, so
//! a partial file is valid.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "scms.toml";

/// Available storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    /// In-memory storage, lost on restart
    Memory,
    /// In-memory storage with a JSON snapshot in `data_dir`
    File,
}

impl FromStr for StorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageType::Memory),
            "file" => Ok(StorageType::File),
            _ => Err(Error::config(format!(
                "Invalid storage type: {s}. Valid options: memory, file"
            ))),
        }
    }
}

/// How editor users are identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Trust a user header set by an authenticating reverse proxy
    Header,
    /// Everyone is an editor (local development only)
    Open,
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "header" => Ok(AuthMode::Header),
            "open" => Ok(AuthMode::Open),
            _ => Err(Error::config(format!(
                "Invalid auth mode: {s}. Valid options: header, open"
            ))),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Size and cost limits
    pub limits: LimitsConfig,

    /// Editor authentication
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub http_addr: SocketAddr,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub storage_type: StorageType,

    /// Data directory path (file backend)
    pub data_dir: PathBuf,
}

/// Limits configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Uploaded files must be strictly smaller than this (bytes)
    pub max_file_size: usize,

    /// Largest accepted request body (bytes)
    pub max_request_bytes: usize,

    /// Deepest record tree materialized for templates and exports
    pub max_tree_depth: usize,

    /// Store calls allowed while serving one request
    pub max_store_calls: usize,
}

/// Authentication configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How users are identified
    pub mode: AuthMode,

    /// Header carrying the authenticated user (header mode)
    pub user_header: String,

    /// Where `/login` sends anonymous users
    pub login_url: String,

    /// Where `/logout` sends signed-in users
    pub logout_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact, full)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 0x100000, // 1MB
            max_request_bytes: 64 * 1024 * 1024, // 64MB, room for whole-site archives
            max_tree_depth: 32,
            max_store_calls: 10_000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Header,
            user_header: "x-forwarded-email".to_string(),
            login_url: "/oauth2/sign_in".to_string(),
            logout_url: "/oauth2/sign_out".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: file (explicit path, else `scms.toml` if present,
    /// else defaults), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply `SCMS_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        // Server overrides
        if let Some(addr) = lookup("SCMS_HTTP_ADDR") {
            self.server.http_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        }

        // Storage overrides
        if let Some(storage_type) = lookup("SCMS_STORAGE_TYPE") {
            self.storage.storage_type = storage_type.parse()?;
        }

        if let Some(data_dir) = lookup("SCMS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        // Limit overrides
        if let Some(size) = lookup("SCMS_MAX_FILE_SIZE") {
            self.limits.max_file_size = size
                .parse()
                .map_err(|e| Error::config(format!("Invalid max file size: {}", e)))?;
        }

        // Auth overrides
        if let Some(mode) = lookup("SCMS_AUTH_MODE") {
            self.auth.mode = mode.parse()?;
        }

        if let Some(header) = lookup("SCMS_USER_HEADER") {
            self.auth.user_header = header;
        }

        // Logging overrides
        if let Some(level) = lookup("SCMS_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("SCMS_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_file_size == 0 {
            return Err(Error::config("max_file_size must be positive"));
        }

        if self.limits.max_request_bytes < self.limits.max_file_size {
            return Err(Error::config(
                "max_request_bytes must be at least max_file_size",
            ));
        }

        if self.limits.max_tree_depth == 0 || self.limits.max_store_calls == 0 {
            return Err(Error::config(
                "max_tree_depth and max_store_calls must be positive",
            ));
        }

        if self.auth.mode == AuthMode::Header && self.auth.user_header.trim().is_empty() {
            return Err(Error::config("header auth needs a user_header"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "full" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.limits.max_file_size, 0x100000);
        assert_eq!(config.storage.storage_type, StorageType::Memory);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scms.toml");
        std::fs::write(
            &path,
            "[storage]\nstorage_type = \"File\"\ndata_dir = \"/tmp/site\"\n\n[auth]\nmode = \"Open\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.storage_type, StorageType::File);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/site"));
        assert_eq!(config.auth.mode, AuthMode::Open);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SCMS_HTTP_ADDR", "127.0.0.1:9000"),
            ("SCMS_STORAGE_TYPE", "file"),
            ("SCMS_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.storage.storage_type, StorageType::File);
        assert_eq!(config.logging.level, "debug");

        let bad = Config::default().apply_env_overrides(|name| {
            (name == "SCMS_HTTP_ADDR").then(|| "nowhere".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.max_request_bytes = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.user_header.clear();
        assert!(config.validate().is_err());
        config.auth.mode = AuthMode::Open;
        config.validate().unwrap();
    }
}
