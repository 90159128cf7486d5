//! Configuration module

pub mod settings;

pub use settings::{
    AdmissionConfig, AuthConfig, DownstreamConfig, LoggingConfig, QueueConfig, RateLimitConfig,
    ServerConfig, Settings, StorageConfig,
};
