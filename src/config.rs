//! Configuration management for Bulwark.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{BulwarkError, Result};

/// Prefix for environment overrides, e.g. `BULWARK__RATE_LIMITING__WINDOW_SECS=30`.
const ENV_PREFIX: &str = "BULWARK";

/// Longest accepted rate-limit window (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest accepted rotation interval.
pub const MAX_ROTATION_INTERVAL_DAYS: i64 = 3650;

/// Longest accepted retention period.
pub const MAX_RETENTION_DAYS: i64 = 36500;

/// Main configuration for the Bulwark service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// API key rotation configuration
    #[serde(default)]
    pub keys: KeyConfig,

    /// User data retention configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// Use the first `x-forwarded-for` entry as the client identity
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per client per window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Number of tracked clients above which expired windows are evicted
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

fn default_requests_per_window() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_tracked_clients() -> usize {
    10000
}

/// API key rotation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Path of the persisted key record
    #[serde(default = "default_key_path")]
    pub path: PathBuf,

    /// Minimum days between rotations
    #[serde(default = "default_rotation_interval_days")]
    pub rotation_interval_days: i64,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            path: default_key_path(),
            rotation_interval_days: default_rotation_interval_days(),
        }
    }
}

fn default_key_path() -> PathBuf {
    PathBuf::from("api_keys.json")
}

fn default_rotation_interval_days() -> i64 {
    7
}

/// User data retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Directory holding one `<user_id>.json` document per user
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum record age in days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("user_data")
}

fn default_max_age_days() -> i64 {
    30
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BulwarkConfig {
    /// Load configuration from an optional file, layered with `BULWARK__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config: BulwarkConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BulwarkConfig =
            serde_yaml::from_str(yaml).map_err(|e| BulwarkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would disable a policy outright or overflow the
    /// timestamp arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.requests_per_window == 0 {
            return Err(BulwarkError::Config(
                "rate_limiting.requests_per_window must be positive".to_string(),
            ));
        }
        if !(1..=MAX_WINDOW_SECS).contains(&self.rate_limiting.window_secs) {
            return Err(BulwarkError::Config(format!(
                "rate_limiting.window_secs must be between 1 and {MAX_WINDOW_SECS}"
            )));
        }
        if !(1..=MAX_ROTATION_INTERVAL_DAYS).contains(&self.keys.rotation_interval_days) {
            return Err(BulwarkError::Config(format!(
                "keys.rotation_interval_days must be between 1 and {MAX_ROTATION_INTERVAL_DAYS}"
            )));
        }
        retention_period(self.retention.max_age_days).map_err(|_| {
            BulwarkError::Config(format!(
                "retention.max_age_days must be between 1 and {MAX_RETENTION_DAYS}"
            ))
        })?;
        Ok(())
    }

    pub fn window(&self) -> Result<chrono::Duration> {
        i64::try_from(self.rate_limiting.window_secs)
            .ok()
            .filter(|secs| *secs as u64 <= MAX_WINDOW_SECS)
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| BulwarkError::Config("rate_limiting.window_secs out of range".to_string()))
    }

    pub fn rotation_interval(&self) -> Result<chrono::Duration> {
        Some(self.keys.rotation_interval_days)
            .filter(|days| (1..=MAX_ROTATION_INTERVAL_DAYS).contains(days))
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| {
                BulwarkError::Config("keys.rotation_interval_days out of range".to_string())
            })
    }

    pub fn max_age(&self) -> Result<chrono::Duration> {
        retention_period(self.retention.max_age_days)
    }
}

/// Convert a retention period in days, rejecting values outside `1..=MAX_RETENTION_DAYS`.
pub fn retention_period(days: i64) -> Result<chrono::Duration> {
    Some(days)
        .filter(|days| (1..=MAX_RETENTION_DAYS).contains(days))
        .and_then(chrono::Duration::try_days)
        .ok_or_else(|| {
            BulwarkError::Config(format!(
                "retention period must be between 1 and {MAX_RETENTION_DAYS} days, got {days}"
            ))
        })
}
