//! Lease helper
//!
//! Convenience wrappers over the arbiter for pipeline stages. `with_lease`
//! gives "GPU or a single catchable error" semantics; `try_acquire` hands
//! back `None` so the stage can run its own degradation (CPU inference, or
//! silently skipping a low-priority enhancement).

use std::future::Future;

use babel_edge_core::{TaskType, TraceContext};

use crate::arbiter::GpuArbiter;
use crate::lease::{AcquireOutcome, AcquireRequest, GpuLease, LeaseId, SkipReason};
use crate::LeaseError;

/// Stage-facing entry points to the arbiter.
#[derive(Clone)]
pub struct LeaseHelper {
    arbiter: GpuArbiter,
}

impl LeaseHelper {
    pub fn new(arbiter: GpuArbiter) -> Self {
        Self { arbiter }
    }

    /// The arbiter this helper wraps.
    pub fn arbiter(&self) -> &GpuArbiter {
        &self.arbiter
    }

    /// Run `f` under an accelerator lease.
    ///
    /// Resolves the task type to its policy, acquires, and invokes `f` with
    /// the lease id. The lease is released when `f` resolves, on every exit
    /// path. Every denial becomes a [`LeaseError`] for the stage to absorb.
    ///
    /// When the arbiter is disabled this degenerates to calling `f` directly
    /// under a dummy lease, so disabling never changes pipeline behavior
    /// beyond removing contention control.
    pub async fn with_lease<T, Fut>(
        &self,
        gpu_key: &str,
        task_type: TaskType,
        trace: TraceContext,
        f: impl FnOnce(LeaseId) -> Fut,
    ) -> Result<T, LeaseError>
    where
        Fut: Future<Output = T>,
    {
        let request = AcquireRequest::for_task(&self.arbiter.config(), gpu_key, task_type, trace);
        match self.arbiter.acquire(request).await {
            AcquireOutcome::Acquired(lease) => {
                let out = f(lease.id()).await;
                lease.release();
                Ok(out)
            }
            AcquireOutcome::Skipped {
                reason: SkipReason::Timeout,
            } => Err(LeaseError::Timeout {
                task_type,
                gpu_key: gpu_key.to_string(),
            }),
            AcquireOutcome::Skipped { reason } => Err(LeaseError::Skipped { task_type, reason }),
            AcquireOutcome::FallbackCpu => Err(LeaseError::FallbackCpu { task_type }),
        }
    }

    /// Try to get a lease; `None` on any denial.
    ///
    /// The caller owns the returned lease and must release it (dropping it
    /// releases too).
    pub async fn try_acquire(
        &self,
        gpu_key: &str,
        task_type: TaskType,
        trace: TraceContext,
    ) -> Option<GpuLease> {
        let request = AcquireRequest::for_task(&self.arbiter.config(), gpu_key, task_type, trace);
        match self.arbiter.acquire(request).await {
            AcquireOutcome::Acquired(lease) => Some(lease),
            AcquireOutcome::Skipped { .. } | AcquireOutcome::FallbackCpu => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_edge_config::{ArbiterConfig, BusyPolicy, TaskPolicy};

    fn helper(config: ArbiterConfig) -> LeaseHelper {
        LeaseHelper::new(GpuArbiter::new(config))
    }

    #[tokio::test]
    async fn test_with_lease_runs_body_and_releases() {
        let helper = helper(ArbiterConfig::default());
        let result = helper
            .with_lease("gpu:0", TaskType::Asr, TraceContext::none(), |_| async { 42 })
            .await;
        assert_eq!(result.unwrap(), 42);
        // Released: the key is free for the next grant.
        assert!(!helper.arbiter().metrics_snapshot("gpu:0").holder_busy);
    }

    #[tokio::test]
    async fn test_with_lease_converts_skip_into_error() {
        let helper = helper(ArbiterConfig::default());
        let held = helper
            .try_acquire("gpu:0", TaskType::Asr, TraceContext::none())
            .await
            .expect("free key grants");

        let result = helper
            .with_lease("gpu:0", TaskType::SemanticRepair, TraceContext::none(), |_| async { () })
            .await;
        assert_eq!(
            result.unwrap_err(),
            LeaseError::Skipped {
                task_type: TaskType::SemanticRepair,
                reason: SkipReason::Busy
            }
        );
        held.release();
    }

    #[tokio::test]
    async fn test_with_lease_converts_fallback_into_error() {
        let mut config = ArbiterConfig::default();
        config.policies.insert(
            "nmt".to_string(),
            TaskPolicy {
                priority: 80,
                max_wait_ms: 1000,
                busy_policy: BusyPolicy::FallbackCpu,
            },
        );
        let helper = helper(config);
        let _held = helper
            .try_acquire("gpu:0", TaskType::Asr, TraceContext::none())
            .await
            .expect("free key grants");

        let result = helper
            .with_lease("gpu:0", TaskType::Nmt, TraceContext::none(), |_| async { () })
            .await;
        assert_eq!(
            result.unwrap_err(),
            LeaseError::FallbackCpu {
                task_type: TaskType::Nmt
            }
        );
    }

    #[tokio::test]
    async fn test_try_acquire_returns_none_when_denied() {
        let helper = helper(ArbiterConfig::default());
        let held = helper
            .try_acquire("gpu:0", TaskType::Asr, TraceContext::none())
            .await
            .expect("free key grants");

        let denied = helper
            .try_acquire("gpu:0", TaskType::SemanticRepair, TraceContext::none())
            .await;
        assert!(denied.is_none());

        // Dropping the held lease releases the key.
        drop(held);
        let again = helper
            .try_acquire("gpu:0", TaskType::SemanticRepair, TraceContext::none())
            .await;
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_disabled_arbiter_is_a_noop_wrapper() {
        let config = ArbiterConfig {
            enabled: false,
            ..ArbiterConfig::default()
        };
        let helper = helper(config);

        // Both entry points succeed without queueing, even "concurrently".
        let lease = helper
            .try_acquire("gpu:0", TaskType::Asr, TraceContext::none())
            .await
            .expect("disabled arbiter always grants");
        let result = helper
            .with_lease("gpu:0", TaskType::Nmt, TraceContext::none(), |_| async { "ok" })
            .await;
        assert_eq!(result.unwrap(), "ok");
        lease.release();
    }
}
