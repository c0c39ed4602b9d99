//! Accelerator leases
//!
//! A lease is a time-bounded exclusive grant over one accelerator key. It is
//! created by the arbiter and destroyed by `release()` (or by the watchdog if
//! the holder exceeds its hold budget). Dropping a lease releases it, so the
//! helper entry points get release-on-every-exit-path for free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use babel_edge_config::{ArbiterConfig, BusyPolicy};
use babel_edge_core::{TaskType, TraceContext};

use crate::arbiter::Shared;

/// Unique lease identifier, minted per grant.
pub type LeaseId = Uuid;

/// Why an acquire was denied without a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The accelerator was held and the policy does not queue
    Busy,
    /// The wait queue was already at its limit
    QueueFull,
    /// The request waited longer than its policy allows
    Timeout,
}

impl SkipReason {
    /// Stable name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Busy => "busy",
            SkipReason::QueueFull => "queue_full",
            SkipReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`crate::GpuArbiter::acquire`].
#[derive(Debug)]
pub enum AcquireOutcome {
    /// Exclusive use granted; the caller owns the lease until release
    Acquired(GpuLease),
    /// Denied; the caller should skip the step (or retry later on its own)
    Skipped { reason: SkipReason },
    /// Denied; the caller should run the equivalent work on CPU
    FallbackCpu,
}

/// A fully-resolved acquire request.
///
/// Built by merging the global arbiter defaults with the task type's policy;
/// [`AcquireRequest::for_task`] does that merge.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// Opaque accelerator key
    pub gpu_key: String,
    /// Task classification, used for policy lookup and logging only
    pub task_type: TaskType,
    /// Ordinal priority; higher is granted first
    pub priority: i32,
    /// Queued-wait budget under a wait policy
    pub max_wait: Duration,
    /// Hold budget enforced by the watchdog
    pub hold_max: Duration,
    /// Wait-queue capacity for this key
    pub queue_limit: usize,
    /// Degradation strategy while the key is held
    pub busy_policy: BusyPolicy,
    /// Correlation metadata for logging
    pub trace: TraceContext,
}

impl AcquireRequest {
    /// Merge the arbiter configuration with the task type's policy.
    pub fn for_task(
        config: &ArbiterConfig,
        gpu_key: impl Into<String>,
        task_type: TaskType,
        trace: TraceContext,
    ) -> Self {
        let policy = config.policy_for(task_type);
        Self {
            gpu_key: gpu_key.into(),
            task_type,
            priority: policy.priority,
            max_wait: policy.max_wait(),
            hold_max: config.default_hold_max(),
            queue_limit: config.default_queue_limit,
            busy_policy: policy.busy_policy,
            trace,
        }
    }
}

/// Exclusive grant over one accelerator key.
///
/// Releases on drop; `release()` is idempotent and a no-op once the watchdog
/// has reclaimed the lease.
pub struct GpuLease {
    id: LeaseId,
    gpu_key: String,
    task_type: TaskType,
    acquired_at: Instant,
    hold_max: Duration,
    released: AtomicBool,
    /// `None` for the dummy lease handed out while the arbiter is disabled.
    shared: Option<Arc<Shared>>,
}

impl GpuLease {
    pub(crate) fn granted(
        shared: Arc<Shared>,
        gpu_key: &str,
        task_type: TaskType,
        hold_max: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            gpu_key: gpu_key.to_string(),
            task_type,
            acquired_at: Instant::now(),
            hold_max,
            released: AtomicBool::new(false),
            shared: Some(shared),
        }
    }

    /// Dummy always-releasable lease for disabled-arbiter mode.
    pub(crate) fn detached(gpu_key: &str, task_type: TaskType) -> Self {
        Self {
            id: Uuid::new_v4(),
            gpu_key: gpu_key.to_string(),
            task_type,
            acquired_at: Instant::now(),
            hold_max: Duration::ZERO,
            released: AtomicBool::new(false),
            shared: None,
        }
    }

    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn gpu_key(&self) -> &str {
        &self.gpu_key
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Hold budget the watchdog enforces for this lease.
    pub fn hold_max(&self) -> Duration {
        self.hold_max
    }

    /// How long this lease has been held.
    pub fn held(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Release the accelerator and wake the next queued waiter.
    ///
    /// Safe to call more than once; the second call is a no-op, as is a
    /// release after watchdog reclamation.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = &self.shared {
            shared.release_lease(&self.gpu_key, self.id);
        }
    }

    /// Mark released without touching arbiter state. Used when a minted lease
    /// could not be delivered to its waiter and the holder slot was never set.
    pub(crate) fn defuse(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl Drop for GpuLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for GpuLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuLease")
            .field("id", &self.id)
            .field("gpu_key", &self.gpu_key)
            .field("task_type", &self.task_type)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_task_merges_policy_and_defaults() {
        let config = ArbiterConfig::default();
        let request =
            AcquireRequest::for_task(&config, "gpu:0", TaskType::Asr, TraceContext::none());
        assert_eq!(request.priority, 90);
        assert_eq!(request.max_wait, Duration::from_millis(3000));
        assert_eq!(request.busy_policy, BusyPolicy::Wait);
        assert_eq!(request.queue_limit, config.default_queue_limit);
        assert_eq!(request.hold_max, config.default_hold_max());
    }

    #[test]
    fn test_detached_lease_release_is_noop() {
        let lease = GpuLease::detached("gpu:0", TaskType::Tts);
        lease.release();
        lease.release();
    }

    #[test]
    fn test_lease_ids_are_unique() {
        let a = GpuLease::detached("gpu:0", TaskType::Asr);
        let b = GpuLease::detached("gpu:0", TaskType::Asr);
        assert_ne!(a.id(), b.id());
    }
}
