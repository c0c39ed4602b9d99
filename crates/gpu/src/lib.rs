//! Accelerator admission control
//!
//! This crate owns the GPU arbiter: per accelerator key it tracks the current
//! lease holder and a priority-ordered wait queue, enforces bounded waits, and
//! runs a watchdog that reclaims leases held past their budget. Pipeline
//! stages go through the [`LeaseHelper`] entry points rather than calling the
//! arbiter directly.

pub mod arbiter;
pub mod helper;
pub mod lease;
pub mod metrics;

pub use arbiter::GpuArbiter;
pub use helper::LeaseHelper;
pub use lease::{AcquireOutcome, AcquireRequest, GpuLease, LeaseId, SkipReason};
// `crate::` disambiguates from the external `metrics` crate.
pub use crate::metrics::GpuMetricsSnapshot;

use babel_edge_core::TaskType;
use thiserror::Error;

/// Lease denial, as surfaced by [`LeaseHelper::with_lease`].
///
/// Callers are expected to absorb these and degrade (pass text through
/// unrepaired, run on CPU, drop an enhancement step) rather than fail the
/// surrounding job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// Busy under a skip policy, or the wait queue was full
    #[error("accelerator busy for {task_type}: {reason}")]
    Skipped {
        task_type: TaskType,
        reason: SkipReason,
    },

    /// Busy under a fallback policy: run the equivalent work on CPU
    #[error("accelerator busy for {task_type}: fall back to CPU")]
    FallbackCpu { task_type: TaskType },

    /// A WAIT request outlived its policy's wait budget
    #[error("timed out waiting for {gpu_key} ({task_type})")]
    Timeout { task_type: TaskType, gpu_key: String },
}

impl From<LeaseError> for babel_edge_core::Error {
    fn from(err: LeaseError) -> Self {
        babel_edge_core::Error::Lease(err.to_string())
    }
}
