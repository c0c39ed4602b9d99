//! Node State
//!
//! Shared state for the node's coordination layer: configuration, the
//! accelerator arbiter with its watchdog, the stage-facing lease helper, and
//! the per-(session, stage) sequential executor.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use babel_edge_config::Settings;
use babel_edge_gpu::{GpuArbiter, LeaseHelper};
use babel_edge_ordering::SequentialExecutor;

/// Coordination layer handed to every pipeline stage.
#[derive(Clone)]
pub struct NodeState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Accelerator arbiter
    pub arbiter: GpuArbiter,
    /// Stage-facing lease entry points
    pub leases: LeaseHelper,
    /// Per-(session, stage) ordering gate
    pub executor: SequentialExecutor,
    watchdog: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl NodeState {
    /// Build the coordination layer and start the arbiter watchdog.
    pub fn new(config: Settings) -> Self {
        let arbiter = GpuArbiter::with_sample_window(
            config.arbiter.clone(),
            config.observability.sample_window,
        );
        let leases = LeaseHelper::new(arbiter.clone());
        let executor = SequentialExecutor::new(&config.executor);

        let watchdog = if config.arbiter.enabled {
            Some(arbiter.start_watchdog())
        } else {
            None
        };

        tracing::info!(
            gpu_keys = config.arbiter.gpu_keys.len(),
            enabled = config.arbiter.enabled,
            "Initialized coordination layer"
        );

        Self {
            config: Arc::new(config),
            arbiter,
            leases,
            executor,
            watchdog: Arc::new(Mutex::new(watchdog)),
        }
    }

    /// Apply re-read settings without restarting.
    ///
    /// Only the arbiter section is hot-swappable; it takes effect for
    /// subsequent acquires. Holders and queued waiters keep the budgets they
    /// were admitted with.
    pub fn apply_settings(&self, settings: &Settings) {
        self.arbiter.update_config(settings.arbiter.clone());
    }

    /// Stop the watchdog task. Idempotent; safe to call from shutdown paths
    /// that may run more than once.
    pub fn shutdown(&self) {
        if let Some(tx) = self.watchdog.lock().take() {
            let _ = tx.send(true);
            tracing::info!("Coordination layer shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_builds_from_default_settings() {
        let state = NodeState::new(Settings::default());
        assert!(state.arbiter.is_enabled());
        assert_eq!(state.executor.stage_count(), 0);
        state.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let state = NodeState::new(Settings::default());
        state.shutdown();
        state.shutdown();
    }

    #[tokio::test]
    async fn test_disabled_arbiter_starts_no_watchdog() {
        let mut settings = Settings::default();
        settings.arbiter.enabled = false;
        let state = NodeState::new(settings);
        assert!(!state.arbiter.is_enabled());
        state.shutdown();
    }

    #[tokio::test]
    async fn test_apply_settings_swaps_arbiter_config() {
        let state = NodeState::new(Settings::default());
        let mut settings = Settings::default();
        settings.arbiter.default_queue_limit = 2;
        state.apply_settings(&settings);
        assert_eq!(state.arbiter.config().default_queue_limit, 2);
        state.shutdown();
    }
}
