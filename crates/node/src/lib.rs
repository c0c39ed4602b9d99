//! Composition root for the babel-edge concurrency core
//!
//! Wires the accelerator arbiter and the sequential executor together from
//! [`babel_edge_config::Settings`] and owns their lifecycle (watchdog startup
//! and shutdown). Pipeline stages receive a [`NodeState`] by reference and
//! never touch global state.

pub mod state;

pub use state::NodeState;
