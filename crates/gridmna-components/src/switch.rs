//! Two-state switch (§4.3): closed conductance G_on, open conductance
//! G_off. A transition bumps the topology's matrix-era generation so the
//! solver re-factorizes the LHS.

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    Attribute, AttributeTable, AttributeValue, Component, ComponentMeta, Domain, InitContext,
    MnaScalar, ParameterError, Switchable, SystemMatrix,
};
use nalgebra::DVector;

use crate::two_terminal::{stamp_multiphase_conductance, terminal_voltage_diff};

/// Small conductance standing in for a closed switch's ohmic resistance.
pub const G_ON: f64 = 1e3;
/// Small conductance standing in for an open switch's leakage resistance.
pub const G_OFF: f64 = 1e-9;

pub struct Switch<T: MnaScalar> {
    meta: ComponentMeta,
    width: usize,
    closed: bool,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    voltage: Rc<Cell<T>>,
    attrs: AttributeTable,
}

impl<T: MnaScalar> Switch<T> {
    pub fn new(id: impl Into<String>, domain: Domain, initially_closed: bool) -> Self {
        let id = id.into();

        let voltage = Rc::new(Cell::new(T::zero()));
        let mut attrs = AttributeTable::new();
        let read_voltage = voltage.clone();
        attrs.register(Attribute::read_only("voltage", move || {
            read_voltage.get().to_attribute_value()
        }));

        Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain,
            },
            width: domain.phase_type().width(),
            closed: initially_closed,
            base_pos: None,
            base_neg: None,
            voltage,
            attrs,
        }
    }

    fn conductance(&self) -> f64 {
        if self.closed {
            G_ON
        } else {
            G_OFF
        }
    }
}

impl<T: MnaScalar> Switchable for Switch<T> {
    fn close(&mut self) -> bool {
        let changed = !self.closed;
        self.closed = true;
        changed
    }

    fn open(&mut self) -> bool {
        let changed = self.closed;
        self.closed = false;
        changed
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T: MnaScalar> Component<T> for Switch<T> {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<T>) -> Result<(), ParameterError> {
        self.base_pos = ctx.terminal_indices[0];
        self.base_neg = ctx.terminal_indices[1];
        let diff = terminal_voltage_diff(ctx, 0, 1, self.width);
        self.voltage.set(diff[0]);
        Ok(())
    }

    fn pre_step(&mut self, _delta_t: f64) -> Vec<(usize, T)> {
        Vec::new()
    }

    fn post_step(&mut self, solution: &DVector<T>, _delta_t: f64) {
        if let Some(base) = self.base_pos {
            let neg = self.base_neg.map(|n| solution[n]).unwrap_or_else(T::zero);
            self.voltage.set(solution[base] - neg);
        }
    }

    fn stamp(&self, matrix: &mut SystemMatrix<T>) {
        let g = T::from_real(self.conductance());
        stamp_multiphase_conductance(matrix, self.base_pos, self.base_neg, self.width, g);
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }

    fn as_switchable_mut(&mut self) -> Option<&mut dyn Switchable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_core::{PhaseType, RhsAccumulator, SystemTopologyBuilder};

    #[test]
    fn closed_switch_passes_current_with_negligible_drop() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("n1").unwrap();
        builder
            .add_component(
                Box::new(Switch::<f64>::new("sw1", Domain::Sp, true)),
                vec!["n1".to_string(), "GND".to_string()],
            )
            .unwrap();
        let topo = builder.build().unwrap();
        let mut matrix = topo.assemble_matrix(1e-3);
        matrix.factorize();
        let mut rhs = RhsAccumulator::<f64>::new(topo.matrix_size());
        rhs.inject_current(Some(0), None, 1.0);
        let solution = matrix.solve(rhs.as_vector()).unwrap();
        assert!(solution[0].abs() < 1e-2);
    }

    #[test]
    fn open_switch_blocks_current_leaving_node_near_floating() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("n1").unwrap();
        builder
            .add_component(
                Box::new(Switch::<f64>::new("sw1", Domain::Sp, false)),
                vec!["n1".to_string(), "GND".to_string()],
            )
            .unwrap();
        let topo = builder.build().unwrap();
        let mut matrix = topo.assemble_matrix(1e-3);
        matrix.factorize();
        let mut rhs = RhsAccumulator::<f64>::new(topo.matrix_size());
        rhs.inject_current(Some(0), None, 1.0);
        let solution = matrix.solve(rhs.as_vector()).unwrap();
        assert!(solution[0] > 1e6);
    }

    #[test]
    fn close_and_open_report_state_transitions() {
        let mut sw = Switch::<f64>::new("sw1", Domain::Emt, false);
        assert!(sw.close());
        assert!(!sw.close());
        assert!(sw.open());
        assert!(!sw.open());
    }
}
