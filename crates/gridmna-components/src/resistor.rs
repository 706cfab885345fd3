//! Ideal resistor: G = 1/R only, no history term (§4.2).

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    Attribute, AttributeTable, AttributeValue, Component, ComponentMeta, Domain, InitContext,
    MnaScalar, ParameterError, SystemMatrix,
};
use nalgebra::DVector;

use crate::two_terminal::{stamp_multiphase_conductance, terminal_voltage_diff};

/// Two-terminal resistor. Generic over the scalar type so the same stamp
/// shape serves EMT (`f64`, width 3) and SP/DP (`Complex64`, width 1).
#[derive(Debug)]
pub struct Resistor<T: MnaScalar> {
    meta: ComponentMeta,
    resistance: f64,
    width: usize,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    voltage: Rc<Cell<T>>,
    attrs: AttributeTable,
}

impl<T: MnaScalar> Resistor<T> {
    pub fn new(
        id: impl Into<String>,
        resistance: f64,
        domain: Domain,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        if !resistance.is_finite() {
            return Err(ParameterError::NonFinite {
                component: id,
                parameter: "resistance".to_string(),
            });
        }
        if resistance < 0.0 {
            return Err(ParameterError::Negative {
                component: id,
                parameter: "resistance".to_string(),
                value: resistance,
            });
        }

        let voltage = Rc::new(Cell::new(T::zero()));
        let mut attrs = AttributeTable::new();
        let read_voltage = voltage.clone();
        attrs.register(Attribute::read_only("voltage", move || {
            read_voltage.get().to_attribute_value()
        }));
        attrs.register(Attribute::read_only("resistance", move || {
            AttributeValue::Real(resistance)
        }));

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain,
            },
            resistance,
            width: domain.phase_type().width(),
            base_pos: None,
            base_neg: None,
            voltage,
            attrs,
        })
    }
}

impl<T: MnaScalar> Component<T> for Resistor<T> {
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
        let g = T::from_real(1.0 / self.resistance);
        stamp_multiphase_conductance(matrix, self.base_pos, self.base_neg, self.width, g);
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}
