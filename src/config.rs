use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    /// Separate file for data-integrity events, kept for reconciliation
    #[serde(default = "default_integrity_log_file")]
    pub integrity_log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL (networks, address pool, ledger, sagas)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

fn default_integrity_log_file() -> String {
    "integrity.log".to_string()
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "wallet.log".to_string(),
            integrity_log_file: default_integrity_log_file(),
            use_json: false,
            rotation: "daily".to_string(),
            postgres_url: None,
            liveness: LivenessConfig::default(),
            recovery: RecoveryConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

/// Node heartbeat window
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    pub operating_timeout_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            operating_timeout_secs: 5 * 60,
        }
    }
}

impl LivenessConfig {
    pub fn operating_timeout(&self) -> Duration {
        Duration::from_secs(self.operating_timeout_secs)
    }
}

/// Transfer saga recovery scan
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoveryConfig {
    pub scan_interval_ms: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 30_000,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaginationConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

impl WalletConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
