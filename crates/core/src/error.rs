//! Error types shared across the node core

use thiserror::Error;

/// Top-level error for the concurrency core.
///
/// The scheduling crates define their own typed errors and convert into this
/// one at crate boundaries.
#[derive(Debug, Error)]
pub enum Error {
    /// Accelerator lease denied or timed out
    #[error("Lease error: {0}")]
    Lease(String),

    /// Sequential ordering contract violated by the caller
    #[error("Ordering error: {0}")]
    Ordering(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for the concurrency core.
pub type Result<T> = std::result::Result<T, Error>;
