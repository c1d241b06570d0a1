use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogQueryError, Result};

pub const LOG_DIR_ENV: &str = "JSON_LOGS_DIR";
const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: ServerMode,
    #[serde(default)]
    pub http_addr: Option<String>,
    #[serde(default)]
    pub http_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Result cap used when a query omits `limit`.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Records returned by a `logs://` resource read.
    #[serde(default = "default_resource_max_records")]
    pub resource_max_records: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            resource_max_records: default_resource_max_records(),
        }
    }
}

fn default_limit() -> usize {
    100
}

fn default_resource_max_records() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            server: ServerConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Load a YAML or JSON config file. JSON is valid YAML, so one parser covers both.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LogQueryError::ConfigError(format!("read {} failed: {e}", path.display()))
        })?;
        let mut cfg: Config = serde_yaml::from_str(&text).map_err(|e| {
            LogQueryError::ConfigError(format!("parse {} failed: {e}", path.display()))
        })?;
        // relative log_dir is taken relative to the config file
        if cfg.log_dir.is_relative() {
            if let Some(parent) = path.parent() {
                cfg.log_dir = parent.join(&cfg.log_dir);
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a config from `JSON_LOGS_DIR`, falling back to `./logs`.
    pub fn from_env() -> Self {
        let dir = std::env::var(LOG_DIR_ENV).unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
        Self::new(dir)
    }

    fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(LogQueryError::ConfigError("log_dir must not be empty".into()));
        }
        if self.query.default_limit == 0 {
            return Err(LogQueryError::ConfigError("query.default_limit must be >= 1".into()));
        }
        Ok(())
    }
}
