//! Sequential executor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the per-(session, stage) ordering gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How long a queued utterance waits for a missing predecessor before
    /// the executor advances past the gap (ms)
    #[serde(default = "default_gap_timeout_ms")]
    pub gap_timeout_ms: u64,
}

fn default_gap_timeout_ms() -> u64 {
    5_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            gap_timeout_ms: default_gap_timeout_ms(),
        }
    }
}

impl ExecutorConfig {
    /// Gap timeout as a `Duration`.
    pub fn gap_timeout(&self) -> Duration {
        Duration::from_millis(self.gap_timeout_ms)
    }
}
