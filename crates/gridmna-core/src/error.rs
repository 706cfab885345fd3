//! Error types raised while building and indexing a [`SystemTopology`](crate::topology::SystemTopology).
//!
//! These cover the initialization-time failure modes from the spec's error
//! taxonomy: topology errors and parameter errors. Both are fatal before any
//! time stepping begins.

use thiserror::Error;

/// Fatal error discovered while assembling a topology, before any stamping occurs.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A terminal referenced a node name that was never added to the topology.
    #[error("component '{component}' terminal {terminal} refers to unknown node '{node}'")]
    UnknownNode {
        component: String,
        terminal: usize,
        node: String,
    },

    /// Two components were registered with the same id.
    #[error("duplicate component id '{id}'")]
    DuplicateComponentId { id: String },

    /// Two components were registered with the same node name.
    #[error("duplicate node name '{name}'")]
    DuplicateNodeName { name: String },

    /// A component's terminal connected to a node whose phase representation
    /// (single complex scalar vs. three-phase ABC) does not match the
    /// component's own domain.
    #[error(
        "component '{component}' terminal {terminal} connects to node '{node}' with mismatched phase type"
    )]
    MismatchedPhaseType {
        component: String,
        terminal: usize,
        node: String,
    },
}

/// Fatal error discovered while a component computes its initial state.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// A parameter evaluated to NaN or +/-Inf after initialization.
    #[error("component '{component}' parameter '{parameter}' is non-finite")]
    NonFinite {
        component: String,
        parameter: String,
    },

    /// A resistance, inductance, or capacitance parameter was negative.
    #[error("component '{component}' parameter '{parameter}' is negative: {value}")]
    Negative {
        component: String,
        parameter: String,
        value: f64,
    },

    /// A parameterization variant that exists in the reference model but is
    /// not supported by this implementation (see the open questions in
    /// DESIGN.md).
    #[error("component '{component}' requested unsupported parameterization '{variant}'")]
    UnsupportedVariant { component: String, variant: String },
}
