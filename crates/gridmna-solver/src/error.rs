//! Error types raised while driving a topology through power flow or
//! time-stepping (§7). Topology/parameter errors are defined in
//! `gridmna-core` and are fatal before any stepping begins; the kinds here
//! are specific to running a solver over an already-built topology.

use thiserror::Error;

use gridmna_core::{MatrixError, ParameterError, TopologyError};

/// Newton-Raphson power flow failed to converge within the iteration cap
/// (§4.6, §7 "Convergence error"). Non-fatal by policy: callers may proceed
/// with the last iterate if they choose to.
#[derive(Debug, Error)]
#[error("power flow did not converge after {iterations} iterations (max mismatch {max_mismatch:.3e}, tolerance {tolerance:.3e})")]
pub struct ConvergenceError {
    pub iterations: usize,
    pub max_mismatch: f64,
    pub tolerance: f64,
}

/// An event targeted a component id the topology does not contain (§7
/// "Event error"). Non-fatal: the event loop logs and skips it.
#[derive(Debug, Error)]
#[error("event at t={time} targets unknown component '{component_id}'")]
pub struct EventError {
    pub time: f64,
    pub component_id: String,
}

/// Fatal failure of a transient run (§7 policy: "Runtime errors abort the
/// loop after flushing the logger").
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("power flow initialization failed: {0}")]
    Convergence(#[from] ConvergenceError),

    /// Non-finite right-hand-side entry after a pre-step, at the named
    /// component (§7 "Runtime numeric error").
    #[error("non-finite rhs entry at t={time} contributed by component '{component_id}'")]
    NonFiniteRhs { time: f64, component_id: String },

    #[error("failed to write logger output: {0}")]
    Logger(#[from] std::io::Error),
}
