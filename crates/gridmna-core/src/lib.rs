//! Core circuit representation and MNA matrix structures for gridmna.
//!
//! This crate has no knowledge of time-stepping or power-flow iteration —
//! see `gridmna-solver` for those. It owns only the data model (§3): nodes,
//! terminals, the component contract (§4.1), the per-era system matrix, and
//! the attribute registry used for logging and cross-wiring.

pub mod attribute;
pub mod component;
pub mod error;
pub mod mna;
pub mod node;
pub mod numeric;
pub mod topology;

pub use attribute::{Attribute, AttributeFlags, AttributeTable, AttributeValue};
pub use component::{Component, ComponentMeta, Domain, InitContext, Switchable};
pub use error::{ParameterError, TopologyError};
pub use mna::{MatrixEra, MatrixError, RhsAccumulator, SystemMatrix};
pub use node::{Node, PhaseType, VirtualNode};
pub use numeric::{inverse_park, park, recover_phasor_from_abc, symmetric_abc_embedding, MnaScalar};
pub use topology::{BuildError, IndexedComponent, SystemTopology, SystemTopologyBuilder};
