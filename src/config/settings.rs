//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub downstream: DownstreamConfig,
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    100
}

fn default_burst() -> u32 {
    200
}

/// Downstream WebUI configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_timeout() -> u64 {
    300_000
}

/// Admission control configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Cooldown in seconds, counted from when a caller's previous job finished
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Callers that bypass cooldown and in-flight checks
    #[serde(default)]
    pub privileged_callers: Vec<String>,
}

fn default_cooldown() -> u64 {
    15
}

/// Job queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum number of jobs waiting behind the one being processed
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// How long terminal jobs and their results stay queryable
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

fn default_max_pending() -> usize {
    100
}

fn default_result_ttl() -> u64 {
    3600
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_sessions_file")]
    pub sessions_file: String,
    #[serde(default = "default_presets_file")]
    pub presets_file: String,
}

fn default_sessions_file() -> String {
    "data/sessions.json".to_string()
}

fn default_presets_file() -> String {
    "data/presets.json".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.enabled", true)?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.requests_per_second", 100)?
            .set_default("rate_limit.burst_size", 200)?
            .set_default("downstream.base_url", "http://127.0.0.1:7860")?
            .set_default("downstream.timeout_ms", 300_000)?
            .set_default("admission.cooldown_secs", 15)?
            .set_default("storage.sessions_file", "data/sessions.json")?
            .set_default("storage.presets_file", "data/presets.json")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with SD_DISPATCH_)
            .add_source(
                Environment::with_prefix("SD_DISPATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        if self.downstream.base_url.is_empty() {
            return Err(AppError::Config(config::ConfigError::Message(
                "Downstream base_url cannot be empty".to_string(),
            )));
        }

        if self.downstream.timeout_ms == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Downstream timeout_ms cannot be 0".to_string(),
            )));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            auth: AuthConfig {
                enabled: true,
                api_keys: vec![],
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_second: default_rps(),
                burst_size: default_burst(),
            },
            downstream: DownstreamConfig {
                base_url: default_base_url(),
                timeout_ms: default_timeout(),
            },
            admission: AdmissionConfig {
                cooldown_secs: default_cooldown(),
                privileged_callers: vec![],
            },
            queue: QueueConfig::default(),
            storage: StorageConfig {
                sessions_file: default_sessions_file(),
                presets_file: default_presets_file(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
