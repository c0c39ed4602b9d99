//! Core types for the babel-edge concurrency core
//!
//! This crate provides the vocabulary shared by the other crates:
//! - Task classification for accelerator admission
//! - Trace metadata carried through scheduling calls for logging
//! - Error types

pub mod error;
pub mod task;
pub mod trace;

pub use error::{Error, Result};
pub use task::TaskType;
pub use trace::TraceContext;
