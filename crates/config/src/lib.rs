#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for sipforge
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (`SIPFORGE_CONFIG_PATH`, `/etc/sipforge/config.toml`
//!   or `~/.config/sipforge/config.toml`)
//! - Environment variables
//! - CLI flags

use serde::{Deserialize, Serialize};
use sipforge_errors::{ConfigError, Error};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "SIPFORGE_CONFIG_PATH";

const SYSTEM_CONFIG_PATH: &str = "/etc/sipforge/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub mets: MetsConfig,

    #[serde(default)]
    pub sign: SignConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values embedded into the compiled METS document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetsConfig {
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub contract_id: String,
    /// Prefix of the package-level object identifier
    #[serde(default = "default_objid_prefix")]
    pub objid_prefix: String,
}

impl Default for MetsConfig {
    fn default() -> Self {
        Self {
            organization_name: String::new(),
            contract_id: String::new(),
            objid_prefix: default_objid_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignConfig {
    pub key_path: Option<PathBuf>,
}

/// Metadata service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_lido_report_id")]
    pub lido_report_id: u64,
    #[serde(default = "default_connection_limit")]
    pub connection_limit: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    pub object_preservation_field_name: Option<String>,
    pub object_preservation_field_type: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            lido_report_id: default_lido_report_id(),
            connection_limit: default_connection_limit(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_timeout(),
            session_ttl_secs: default_session_ttl(),
            object_preservation_field_name: None,
            object_preservation_field_type: None,
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// External packaging tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Virtualenv whose `bin` directory is prepended to `PATH`
    pub virtualenv_path: Option<PathBuf>,
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            virtualenv_path: None,
            agent_name: default_agent_name(),
            identifier_type: default_identifier_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub package_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub session_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_objid_prefix() -> String {
    "sipforge".to_string()
}

fn default_lido_report_id() -> u64 {
    45005
}

fn default_connection_limit() -> usize {
    3
}

fn default_timeout() -> u64 {
    600 // 10 minutes
}

fn default_session_ttl() -> u64 {
    600
}

fn default_agent_name() -> String {
    "sipforge".to_string()
}

fn default_identifier_type() -> String {
    "museumplus".to_string()
}

impl Config {
    /// Candidate configuration paths in lookup order
    #[must_use]
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sipforge").join("config.toml"));
        }
        paths
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        for path in Self::candidate_paths() {
            if fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load_from_file(&path).await;
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an optional path or use the lookup order
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(url) = std::env::var("SIPFORGE_REMOTE_URL") {
            self.remote.url = url;
        }
        if let Ok(username) = std::env::var("SIPFORGE_REMOTE_USERNAME") {
            self.remote.username = username;
        }
        if let Ok(password) = std::env::var("SIPFORGE_REMOTE_PASSWORD") {
            self.remote.password = password;
        }
        if let Ok(level) = std::env::var("SIPFORGE_LOG_LEVEL") {
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => self.logging.level = level,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIPFORGE_LOG_LEVEL".to_string(),
                        value: level,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Check the fields needed to talk to the metadata service
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` for the first empty field.
    pub fn validate_for_remote(&self) -> Result<(), Error> {
        require("remote.url", &self.remote.url)?;
        require("remote.username", &self.remote.username)?;
        require("remote.password", &self.remote.password)?;
        if self.remote.connection_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "remote.connection_limit".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Check the fields needed to compile and sign a package
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` for the first missing field.
    pub fn validate_for_assembly(&self) -> Result<(), Error> {
        require("mets.organization_name", &self.mets.organization_name)?;
        require("mets.contract_id", &self.mets.contract_id)?;
        if self.sign.key_path.is_none() {
            return Err(ConfigError::MissingField {
                field: "sign.key_path".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Directory holding one package directory per object
    #[must_use]
    pub fn package_dir(&self) -> PathBuf {
        self.paths
            .package_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("packages"))
    }

    /// Directory receiving the logs of confirmed packages
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.paths
            .archive_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("archive"))
    }

    /// Directory holding cached session keys
    #[must_use]
    pub fn session_dir(&self) -> PathBuf {
        self.paths.session_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("sipforge")
        })
    }
}

fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sipforge")
}
