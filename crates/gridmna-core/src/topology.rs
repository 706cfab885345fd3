//! `SystemTopology`: the ordered set of nodes and components a solver
//! indexes once and then drives through the time-stepping loop (§3, §4.7).

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::component::{Component, ComponentMeta, InitContext};
use crate::error::{ParameterError, TopologyError};
use crate::mna::{MatrixEra, SystemMatrix};
use crate::node::{Node, PhaseType};
use crate::numeric::MnaScalar;

/// A node not yet resolved to a matrix index, as registered by
/// [`SystemTopology::add_node`] or implicitly by a component's declared
/// virtual nodes.
struct PendingNode<T: MnaScalar> {
    node: Node<T>,
    owner: Option<usize>,
}

/// A component staged for indexing, along with the node names its terminals
/// are wired to.
struct PendingComponent<T: MnaScalar> {
    component: Box<dyn Component<T>>,
    terminal_names: Vec<String>,
}

/// Builder for a [`SystemTopology`]: add nodes and components, then call
/// [`SystemTopologyBuilder::build`] to index and initialize them.
pub struct SystemTopologyBuilder<T: MnaScalar> {
    nominal_frequency: f64,
    delta_t: f64,
    phase_type: PhaseType,
    nodes: IndexMap<String, PendingNode<T>>,
    components: Vec<PendingComponent<T>>,
    component_ids: HashMap<String, usize>,
}

impl<T: MnaScalar> SystemTopologyBuilder<T> {
    pub fn new(nominal_frequency: f64, delta_t: f64, phase_type: PhaseType) -> Self {
        let mut builder = Self {
            nominal_frequency,
            delta_t,
            phase_type,
            nodes: IndexMap::new(),
            components: Vec::new(),
            component_ids: HashMap::new(),
        };
        builder.insert_node("GND".to_string(), None, true);
        builder
    }

    fn insert_node(&mut self, name: String, owner: Option<usize>, _is_ground: bool) {
        // Ground (_is_ground) simply never receives a matrix index in the
        // index-assignment pass below; no special-casing needed here. Insertion
        // order in `nodes` is the node's matrix-assignment order (§4.7).
        let node = Node::new(name.clone(), self.phase_type);
        self.nodes.insert(name, PendingNode { node, owner });
    }

    /// Register a non-ground node by name. Calling this twice with the same
    /// name is a [`TopologyError::DuplicateNodeName`].
    pub fn add_node(&mut self, name: impl Into<String>) -> Result<(), TopologyError> {
        let name = name.into();
        if name == "GND" || self.nodes.contains_key(&name) {
            return Err(TopologyError::DuplicateNodeName { name });
        }
        self.insert_node(name, None, false);
        Ok(())
    }

    /// Register a component wired to the given terminal node names (in
    /// terminal order). The component's declared virtual nodes are created
    /// automatically, named `"<id>::v<k>"`.
    pub fn add_component(
        &mut self,
        component: Box<dyn Component<T>>,
        terminal_names: Vec<String>,
    ) -> Result<(), TopologyError> {
        let meta = component.meta().clone();
        if terminal_names.len() != meta.num_terminals {
            return Err(TopologyError::UnknownNode {
                component: meta.id.clone(),
                terminal: terminal_names.len(),
                node: "<terminal count mismatch>".to_string(),
            });
        }
        if self.component_ids.contains_key(&meta.id) {
            return Err(TopologyError::DuplicateComponentId { id: meta.id.clone() });
        }

        let component_index = self.components.len();
        self.component_ids.insert(meta.id.clone(), component_index);

        for k in 0..meta.num_virtual_nodes {
            let vname = format!("{}::v{}", meta.id, k);
            self.insert_node(vname, Some(component_index), false);
        }

        self.components.push(PendingComponent {
            component,
            terminal_names,
        });
        Ok(())
    }

    /// Assign matrix indices, resolve every terminal/virtual node reference,
    /// and call `initialize` on every component, in insertion order (§4.7).
    pub fn build(mut self) -> Result<SystemTopology<T>, BuildError> {
        // 1. Validate terminal references up front.
        for pending in &self.components {
            let meta = pending.component.meta();
            for (terminal, name) in pending.terminal_names.iter().enumerate() {
                if !self.nodes.contains_key(name) {
                    return Err(BuildError::Topology(TopologyError::UnknownNode {
                        component: meta.id.clone(),
                        terminal,
                        node: name.clone(),
                    }));
                }
            }
        }

        // 2. Assign compact matrix indices in insertion order, skipping ground.
        let width = self.phase_type.width();
        let mut next_index = 0usize;
        let mut index_of: HashMap<String, Option<usize>> = HashMap::new();
        let node_order: Vec<String> = self.nodes.keys().cloned().collect();
        for name in &node_order {
            if name == "GND" {
                index_of.insert(name.clone(), None);
                continue;
            }
            let idx = next_index;
            next_index += width;
            index_of.insert(name.clone(), Some(idx));
            self.nodes.get_mut(name).unwrap().node.assign_matrix_index(idx);
        }
        let matrix_size = next_index;

        // 3. Resolve per-component terminal/virtual indices and initialize.
        let mut virtual_index_map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (name, pending) in &self.nodes {
            if let Some(owner) = pending.owner {
                let idx = index_of[name].expect("virtual node is never ground");
                virtual_index_map.entry(owner).or_default().push(idx);
            }
        }
        for indices in virtual_index_map.values_mut() {
            indices.sort_unstable();
        }

        let mut ordered_nodes: Vec<Node<T>> = Vec::with_capacity(node_order.len());
        let mut node_name_to_slot: HashMap<String, usize> = HashMap::new();
        for name in &node_order {
            node_name_to_slot.insert(name.clone(), ordered_nodes.len());
            ordered_nodes.push(self.nodes.swap_remove(name).unwrap().node);
        }

        let mut components = Vec::with_capacity(self.components.len());
        for (component_index, mut pending) in self.components.into_iter().enumerate() {
            let terminal_indices: Vec<Option<usize>> = pending
                .terminal_names
                .iter()
                .map(|n| index_of[n])
                .collect();
            let virtual_indices = virtual_index_map.remove(&component_index).unwrap_or_default();

            let terminal_nodes: Vec<&Node<T>> = pending
                .terminal_names
                .iter()
                .map(|n| &ordered_nodes[node_name_to_slot[n]])
                .collect();

            let ctx = InitContext {
                nominal_frequency: self.nominal_frequency,
                delta_t: self.delta_t,
                terminal_indices: &terminal_indices,
                virtual_indices: &virtual_indices,
                terminal_nodes: &terminal_nodes,
            };
            pending
                .component
                .initialize(&ctx)
                .map_err(BuildError::Parameter)?;

            components.push(IndexedComponent {
                component: pending.component,
                terminal_indices,
                virtual_indices,
            });
        }

        Ok(SystemTopology {
            nominal_frequency: self.nominal_frequency,
            phase_type: self.phase_type,
            matrix_size,
            nodes: ordered_nodes,
            components,
            generation: 0,
        })
    }
}

/// Either failure mode `build` can report (§7: topology and parameter errors
/// are both fatal before any time stepping).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// A component plus the matrix indices its terminals and virtual nodes
/// resolved to, retained so the component can be re-initialized later
/// (§4.8: a power-flow-seeded run re-runs `initialize` once node voltages
/// have been seeded, not just at build time).
pub struct IndexedComponent<T: MnaScalar> {
    pub component: Box<dyn Component<T>>,
    pub terminal_indices: Vec<Option<usize>>,
    pub virtual_indices: Vec<usize>,
}

impl<T: MnaScalar> std::fmt::Debug for IndexedComponent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedComponent")
            .field("component", &self.component.meta().id)
            .field("terminal_indices", &self.terminal_indices)
            .field("virtual_indices", &self.virtual_indices)
            .finish()
    }
}

/// An indexed, initialized topology ready to be driven by a solver.
#[derive(Debug)]
pub struct SystemTopology<T: MnaScalar> {
    nominal_frequency: f64,
    phase_type: PhaseType,
    matrix_size: usize,
    nodes: Vec<Node<T>>,
    components: Vec<IndexedComponent<T>>,
    /// Monotone generation counter: bumped whenever a switch changes state,
    /// invalidating the cached factorization for the current era (§4.3, §9).
    generation: u64,
}

impl<T: MnaScalar> SystemTopology<T> {
    pub fn nominal_frequency(&self) -> f64 {
        self.nominal_frequency
    }

    pub fn phase_type(&self) -> PhaseType {
        self.phase_type
    }

    pub fn matrix_size(&self) -> usize {
        self.matrix_size
    }

    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node<T>] {
        &mut self.nodes
    }

    pub fn components(&self) -> &[IndexedComponent<T>] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [IndexedComponent<T>] {
        &mut self.components
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bump the era generation, signaling the solver that the cached
    /// factorization is stale (called after a switch event toggles state).
    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Find a component's position by id, for event dispatch.
    pub fn component_index_by_id(&self, id: &str) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.component.meta().id == id)
    }

    /// Build a fresh [`SystemMatrix`] for the current era and stamp every
    /// component into it (§4.7 "build initial system matrix ... factorize").
    pub fn assemble_matrix(&self, delta_t: f64) -> SystemMatrix<T> {
        let era = MatrixEra::new(self.generation, delta_t);
        let mut matrix = SystemMatrix::new(self.matrix_size, era);
        for indexed in &self.components {
            indexed.component.stamp(&mut matrix);
        }
        matrix
    }

    /// Write a freshly solved node-voltage vector back into the node table.
    pub fn write_solution(&mut self, solution: &nalgebra::DVector<T>) {
        let width = self.phase_type.width();
        for node in &mut self.nodes {
            if let Some(index) = node.matrix_index() {
                let values: Vec<T> = (0..width).map(|k| solution[index + k]).collect();
                node.set_voltage(values);
            }
        }
    }

    pub fn component_meta(&self, index: usize) -> &ComponentMeta {
        self.components[index].component.meta()
    }

    /// Re-run `initialize` on every component against the node table's
    /// *current* voltages (§4.8: after a power-flow solution is seeded into
    /// the node table via `set_initial_voltage`, every dynamic component
    /// must be re-initialized from it, not just the node table itself —
    /// otherwise companion-model state like inductor/capacitor history
    /// currents stays at its construction-time default instead of the
    /// steady state implied by the seeded voltages).
    pub fn reinitialize_components(&mut self, delta_t: f64) -> Result<(), ParameterError> {
        let mut node_by_matrix_index: HashMap<usize, usize> = HashMap::new();
        for (slot, node) in self.nodes.iter().enumerate() {
            if let Some(index) = node.matrix_index() {
                node_by_matrix_index.insert(index, slot);
            }
        }
        let ground = Node::ground(self.phase_type);

        for indexed in &mut self.components {
            let terminal_nodes: Vec<&Node<T>> = indexed
                .terminal_indices
                .iter()
                .map(|maybe_index| match maybe_index {
                    Some(index) => &self.nodes[node_by_matrix_index[index]],
                    None => &ground,
                })
                .collect();

            let ctx = InitContext {
                nominal_frequency: self.nominal_frequency,
                delta_t,
                terminal_indices: &indexed.terminal_indices,
                virtual_indices: &indexed.virtual_indices,
                terminal_nodes: &terminal_nodes,
            };
            indexed.component.initialize(&ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeTable;
    use crate::component::{ComponentMeta, Domain};
    use crate::mna::SystemMatrix;

    /// A trivial two-terminal resistor used purely to exercise topology indexing.
    struct TestResistor {
        meta: ComponentMeta,
        resistance: f64,
        node_pos: Option<usize>,
        node_neg: Option<usize>,
        attrs: AttributeTable,
    }

    impl TestResistor {
        fn new(id: &str, resistance: f64) -> Self {
            Self {
                meta: ComponentMeta {
                    id: id.to_string(),
                    name: id.to_string(),
                    num_terminals: 2,
                    num_virtual_nodes: 0,
                    frequencies: vec![],
                    domain: Domain::Emt,
                },
                resistance,
                node_pos: None,
                node_neg: None,
                attrs: AttributeTable::new(),
            }
        }
    }

    impl Component<f64> for TestResistor {
        fn meta(&self) -> &ComponentMeta {
            &self.meta
        }

        fn initialize(&mut self, ctx: &InitContext<f64>) -> Result<(), ParameterError> {
            self.node_pos = ctx.terminal_indices[0];
            self.node_neg = ctx.terminal_indices[1];
            Ok(())
        }

        fn pre_step(&mut self, _delta_t: f64) -> Vec<(usize, f64)> {
            Vec::new()
        }

        fn post_step(&mut self, _solution: &nalgebra::DVector<f64>, _delta_t: f64) {}

        fn stamp(&self, matrix: &mut SystemMatrix<f64>) {
            matrix.stamp_conductance(self.node_pos, self.node_neg, 1.0 / self.resistance);
        }

        fn attributes(&self) -> &AttributeTable {
            &self.attrs
        }
    }

    #[test]
    fn insertion_order_assigns_compact_indices() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Abc);
        builder.add_node("n1").unwrap();
        builder.add_node("n2").unwrap();
        builder
            .add_component(
                Box::new(TestResistor::new("r1", 10.0)),
                vec!["n1".to_string(), "n2".to_string()],
            )
            .unwrap();

        let topo = builder.build().unwrap();
        // Two non-ground ABC nodes => 6 matrix rows.
        assert_eq!(topo.matrix_size(), 6);
        assert_eq!(topo.nodes().len(), 3); // GND + n1 + n2
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Abc);
        builder.add_node("n1").unwrap();
        builder
            .add_component(
                Box::new(TestResistor::new("r1", 10.0)),
                vec!["n1".to_string(), "ghost".to_string()],
            )
            .unwrap();

        let err = builder.build().unwrap_err();
        assert!(matches!(err, BuildError::Topology(TopologyError::UnknownNode { .. })));
    }

    #[test]
    fn duplicate_component_id_is_rejected() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Abc);
        builder.add_node("n1").unwrap();
        builder.add_node("n2").unwrap();
        builder
            .add_component(
                Box::new(TestResistor::new("r1", 10.0)),
                vec!["n1".to_string(), "n2".to_string()],
            )
            .unwrap();
        let err = builder
            .add_component(
                Box::new(TestResistor::new("r1", 20.0)),
                vec!["n1".to_string(), "n2".to_string()],
            )
            .unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateComponentId { .. }));
    }

    #[test]
    fn reordered_insertion_produces_permuted_but_consistent_indexing() {
        // §8 invariant 6: two topologies differing only in insertion order
        // should solve to the same physical voltages (here: same matrix size
        // and same per-node solution once nodes are looked up by name).
        let build = |names: [&str; 2]| {
            let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Single);
            for n in names {
                builder.add_node(n).unwrap();
            }
            builder
                .add_component(
                    Box::new(TestResistor::new("r1", 2.0)),
                    vec![names[0].to_string(), "GND".to_string()],
                )
                .unwrap();
            builder.build().unwrap()
        };

        let a = build(["n1", "n2"]);
        let b = build(["n2", "n1"]);
        assert_eq!(a.matrix_size(), b.matrix_size());
    }
}
