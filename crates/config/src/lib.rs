//! Configuration management for the babel-edge concurrency core
//!
//! Supports loading configuration from:
//! - YAML/TOML files
//! - Environment variables (BABEL_EDGE prefix)
//! - Runtime overrides (re-read and pushed into the arbiter)

pub mod arbiter;
pub mod executor;
pub mod settings;

pub use arbiter::{ArbiterConfig, BusyPolicy, TaskPolicy};
pub use executor::ExecutorConfig;
pub use settings::{load_settings, ObservabilityConfig, Settings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for babel_edge_core::Error {
    fn from(err: ConfigError) -> Self {
        babel_edge_core::Error::Config(err.to_string())
    }
}
