//! Ordered execution of per-utterance work
//!
//! Within one session, a pipeline stage may be invoked concurrently for
//! consecutive utterances, but its results must be committed in utterance
//! order. The [`SequentialExecutor`] is the gate that makes concurrently
//! submitted bodies run one at a time, in non-decreasing index order, per
//! (session, stage) pair. It is independent of the accelerator arbiter; the
//! two compose because stages typically call the executor first and take a
//! lease inside the scheduled body.

pub mod executor;

pub use executor::SequentialExecutor;

use thiserror::Error;

/// Caller-contract violations surfaced by [`SequentialExecutor::execute`].
///
/// A missing predecessor is *not* an error: the executor logs, advances past
/// the gap, and runs the submitted body, because wedging a whole session is
/// worse than occasionally skipping an ordering slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderingError {
    /// The index was already completed; the executor never re-runs a slot
    #[error("stale utterance index {index} (next expected {expected})")]
    StaleIndex { expected: u64, index: u64 },

    /// The index is already queued or running for this (session, stage)
    #[error("utterance index {index} already submitted for this stage")]
    DuplicateIndex { index: u64 },
}

impl From<OrderingError> for babel_edge_core::Error {
    fn from(err: OrderingError) -> Self {
        babel_edge_core::Error::Ordering(err.to_string())
    }
}
