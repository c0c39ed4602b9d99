//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{ArbiterConfig, ConfigError, ExecutorConfig};

/// Top-level settings for the concurrency core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Accelerator arbiter configuration
    #[serde(default)]
    pub arbiter: ArbiterConfig,

    /// Sequential executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arbiter.enabled && self.arbiter.gpu_keys.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "arbiter.gpu_keys".to_string(),
                message: "at least one accelerator key is required while the arbiter is enabled"
                    .to_string(),
            });
        }

        if self.arbiter.default_queue_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "arbiter.default_queue_limit".to_string(),
                message: "queue limit must be at least 1".to_string(),
            });
        }

        if self.arbiter.default_hold_max_ms < self.arbiter.watchdog_interval_ms {
            return Err(ConfigError::InvalidValue {
                field: "arbiter.default_hold_max_ms".to_string(),
                message: "hold budget below the watchdog interval would reclaim healthy leases"
                    .to_string(),
            });
        }

        if self.executor.gap_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.gap_timeout_ms".to_string(),
                message: "a zero gap timeout would skip ordering entirely".to_string(),
            });
        }

        // Unknown policy keys are tolerated (forward compatibility), but worth
        // surfacing so typos don't silently fall back to built-ins.
        for key in self.arbiter.unknown_policy_keys() {
            tracing::warn!("Ignoring policy for unknown task type: {}", key);
        }

        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics emission
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Sample window kept per accelerator key for wait/hold percentiles
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_sample_window() -> usize {
    100
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
            sample_window: default_sample_window(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (BABEL_EDGE prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("BABEL_EDGE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.arbiter.enabled);
        assert_eq!(settings.arbiter.gpu_keys, vec!["gpu:0".to_string()]);
    }

    #[test]
    fn test_zero_queue_limit_rejected() {
        let mut settings = Settings::default();
        settings.arbiter.default_queue_limit = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_gpu_keys_rejected_only_when_enabled() {
        let mut settings = Settings::default();
        settings.arbiter.gpu_keys.clear();
        assert!(settings.validate().is_err());

        settings.arbiter.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_hold_budget_must_cover_watchdog_interval() {
        let mut settings = Settings::default();
        settings.arbiter.default_hold_max_ms = 1_000;
        settings.arbiter.watchdog_interval_ms = 5_000;
        assert!(settings.validate().is_err());
    }
}
