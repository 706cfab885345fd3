//! The component contract (§4.1): every electrical element implements
//! [`Component`] over the scalar type its domain uses.

use crate::attribute::AttributeTable;
use crate::error::ParameterError;
use crate::mna::SystemMatrix;
use crate::numeric::MnaScalar;
use crate::node::{Node, PhaseType};

/// The simulation domain a component was constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Steady-state complex RMS phasor.
    Sp,
    /// Complex dynamic phasor (slowly varying envelope around a carrier).
    Dp,
    /// Three-phase real electromagnetic transient.
    Emt,
}

impl Domain {
    /// The phase representation nodes in this domain carry.
    pub fn phase_type(self) -> PhaseType {
        match self {
            Domain::Sp | Domain::Dp => PhaseType::Single,
            Domain::Emt => PhaseType::Abc,
        }
    }
}

/// Static shape of a component, queried once at topology-build time (§4.1 item 1).
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    pub id: String,
    pub name: String,
    pub num_terminals: usize,
    pub num_virtual_nodes: usize,
    pub frequencies: Vec<f64>,
    pub domain: Domain,
}

/// Resolved node/terminal indices and nominal frequency handed to a
/// component when it initializes (§4.1 item 2).
///
/// `terminal_indices[i]` is `None` when terminal `i` is wired to ground.
/// `virtual_indices[i]` is the matrix index the topology assigned to the
/// component's `i`-th declared virtual node — virtual nodes are never ground.
pub struct InitContext<'a, T: MnaScalar> {
    pub nominal_frequency: f64,
    /// Fixed simulation timestep for this run (Non-goal: no adaptive
    /// time-stepping). Components that use a companion model need this at
    /// construction time because `stamp` (§4.1 item 5) is not itself handed
    /// a Δt — the era's Δt is baked in once here.
    pub delta_t: f64,
    pub terminal_indices: &'a [Option<usize>],
    pub virtual_indices: &'a [usize],
    pub terminal_nodes: &'a [&'a Node<T>],
}

/// The capability interface every electrical element implements (§4.1,
/// §9 "avoid deep class hierarchies ... represent the component set as a
/// tagged variant with a capability interface").
pub trait Component<T: MnaScalar> {
    /// Metadata query (§4.1 item 1).
    fn meta(&self) -> &ComponentMeta;

    /// Compute internal parameters and initial interface state from the
    /// terminal nodes' (already power-flow-seeded) voltages (§4.1 item 2).
    fn initialize(&mut self, ctx: &InitContext<T>) -> Result<(), ParameterError>;

    /// Produce this component's right-hand-side contributions for the
    /// upcoming solve, as `(matrix_index, value)` pairs (§4.1 item 3).
    /// Depends only on state as of the previous post-step.
    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, T)>;

    /// Update observed interface voltage/current and any internal state
    /// that closes an integrator, from the freshly solved node vector
    /// (§4.1 item 4).
    fn post_step(&mut self, solution: &nalgebra::DVector<T>, delta_t: f64);

    /// Add this component's conductance contributions to the shared matrix
    /// (§4.1 item 5). Called once per matrix era.
    fn stamp(&self, matrix: &mut SystemMatrix<T>);

    /// The component's exposed attribute table (§4.1 item 6).
    fn attributes(&self) -> &AttributeTable;

    /// Optional capability accessor for components that also implement
    /// [`Switchable`] (§4.1 "Components that alter topology"). Avoids a
    /// downcast on the `dyn Component` trait object: the event loop calls
    /// this to reach `open`/`close` without knowing the concrete type.
    /// Default `None`; overridden by components like `Switch`.
    fn as_switchable_mut(&mut self) -> Option<&mut dyn Switchable> {
        None
    }
}

/// Implemented in addition to [`Component`] by components that can mutate
/// topology at runtime (§4.1 "Components that alter topology").
pub trait Switchable {
    /// Close the switch. Returns `true` if this changed the switch state
    /// (and therefore must bump the topology's matrix-era generation).
    fn close(&mut self) -> bool;

    /// Open the switch. Returns `true` if this changed the switch state.
    fn open(&mut self) -> bool;

    fn is_closed(&self) -> bool;
}
