//! Capacitor companion models (§4.2): trapezoidal for EMT, complex
//! carrier-shifted trapezoidal for DP, direct admittance for SP. Sign
//! convention matches the spec literally (history current opposes the
//! inductor's), grounded on the same shape as
//! `spicier-solver::transient::companion::CapacitorState`.

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    recover_phasor_from_abc, symmetric_abc_embedding, Attribute, AttributeTable, Component,
    ComponentMeta, Domain, InitContext, ParameterError, SystemMatrix,
};
use nalgebra::{DVector, Vector3};
use num_complex::Complex64;

fn validate_capacitance(id: &str, capacitance: f64) -> Result<(), ParameterError> {
    if !capacitance.is_finite() {
        return Err(ParameterError::NonFinite {
            component: id.to_string(),
            parameter: "capacitance".to_string(),
        });
    }
    if capacitance < 0.0 {
        return Err(ParameterError::Negative {
            component: id.to_string(),
            parameter: "capacitance".to_string(),
            value: capacitance,
        });
    }
    Ok(())
}

/// Three-phase real capacitor, one decoupled trapezoidal companion model per
/// phase (§4.2: G = 2C/Δt, i_h(t) = −i(t−Δt) − G·v(t−Δt)).
pub struct EmtCapacitor {
    meta: ComponentMeta,
    capacitance: f64,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    i_prev: [f64; 3],
    v_prev: [f64; 3],
    last_history: [f64; 3],
    voltage: Rc<Cell<f64>>,
    attrs: AttributeTable,
}

impl EmtCapacitor {
    pub fn new(id: impl Into<String>, capacitance: f64) -> Result<Self, ParameterError> {
        let id = id.into();
        validate_capacitance(&id, capacitance)?;

        let voltage = Rc::new(Cell::new(0.0));
        let mut attrs = AttributeTable::new();
        let read_voltage = voltage.clone();
        attrs.register(Attribute::read_only("voltage_a", move || {
            gridmna_core::AttributeValue::Real(read_voltage.get())
        }));

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain: Domain::Emt,
            },
            capacitance,
            base_pos: None,
            base_neg: None,
            i_prev: [0.0; 3],
            v_prev: [0.0; 3],
            last_history: [0.0; 3],
            voltage,
            attrs,
        })
    }

    fn conductance(&self, delta_t: f64) -> f64 {
        2.0 * self.capacitance / delta_t
    }
}

impl Component<f64> for EmtCapacitor {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<f64>) -> Result<(), ParameterError> {
        self.base_pos = ctx.terminal_indices[0];
        self.base_neg = ctx.terminal_indices[1];
        for phase in 0..3 {
            let pos_v = ctx.terminal_nodes[0].voltage()[phase];
            let neg_v = ctx.terminal_nodes[1].voltage()[phase];
            self.v_prev[phase] = pos_v - neg_v;
        }
        self.voltage.set(self.v_prev[0]);

        // Recover the phasor the seeded terminal voltage carries and derive
        // the steady-state current through the capacitor at that phasor and
        // the nominal frequency, so current and voltage start consistent.
        let omega = 2.0 * std::f64::consts::PI * ctx.nominal_frequency;
        if omega > 0.0 {
            let v_phasor = recover_phasor_from_abc(Vector3::from_row_slice(&self.v_prev));
            let i_phasor = v_phasor * Complex64::new(0.0, omega * self.capacitance);
            let i_abc = symmetric_abc_embedding(i_phasor, omega, 0.0);
            self.i_prev = [i_abc.x, i_abc.y, i_abc.z];
        }
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, f64)> {
        let g = self.conductance(delta_t);
        let mut contributions = Vec::with_capacity(6);
        for phase in 0..3 {
            let i_h = -self.i_prev[phase] - g * self.v_prev[phase];
            self.last_history[phase] = i_h;
            if let Some(pos) = self.base_pos {
                contributions.push((pos + phase, i_h));
            }
            if let Some(neg) = self.base_neg {
                contributions.push((neg + phase, -i_h));
            }
        }
        contributions
    }

    fn post_step(&mut self, solution: &DVector<f64>, delta_t: f64) {
        let g = self.conductance(delta_t);
        for phase in 0..3 {
            let pos_v = self.base_pos.map(|b| solution[b + phase]).unwrap_or(0.0);
            let neg_v = self.base_neg.map(|b| solution[b + phase]).unwrap_or(0.0);
            let v_new = pos_v - neg_v;
            let i_new = self.last_history[phase] + g * v_new;
            self.i_prev[phase] = i_new;
            self.v_prev[phase] = v_new;
        }
        self.voltage.set(self.v_prev[0]);
    }

    fn stamp(&self, matrix: &mut SystemMatrix<f64>) {
        let g = self.conductance(matrix.era().delta_t);
        for phase in 0..3 {
            matrix.stamp_conductance(
                self.base_pos.map(|b| b + phase),
                self.base_neg.map(|b| b + phase),
                g,
            );
        }
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}

/// Complex-domain capacitor serving SP (direct admittance) and DP
/// (carrier-shifted discretized trapezoidal companion) (§4.2).
pub struct PhasorCapacitor {
    meta: ComponentMeta,
    capacitance: f64,
    domain: Domain,
    node_pos: Option<usize>,
    node_neg: Option<usize>,
    i_prev: Complex64,
    v_prev: Complex64,
    last_history: Complex64,
    attrs: AttributeTable,
}

impl PhasorCapacitor {
    pub fn new(
        id: impl Into<String>,
        capacitance: f64,
        domain: Domain,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        validate_capacitance(&id, capacitance)?;
        if !matches!(domain, Domain::Sp | Domain::Dp) {
            return Err(ParameterError::UnsupportedVariant {
                component: id,
                variant: "phasor capacitor requires SP or DP domain".to_string(),
            });
        }

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain,
            },
            capacitance,
            domain,
            node_pos: None,
            node_neg: None,
            i_prev: Complex64::new(0.0, 0.0),
            v_prev: Complex64::new(0.0, 0.0),
            last_history: Complex64::new(0.0, 0.0),
            attrs: AttributeTable::new(),
        })
    }

    /// Carrier-shifted discretized capacitor admittance, dual to the
    /// inductor's Δt/(2L + jωLΔt) form: `2C/Δt + jωC` (§4.2 "analogous for
    /// C"). Reduces to the SP admittance jωC as Δt → ∞.
    fn dp_conductance(&self, omega: f64, delta_t: f64) -> Complex64 {
        dp_capacitor_conductance(self.capacitance, omega, delta_t)
    }

    fn sp_admittance(&self, omega: f64) -> Complex64 {
        sp_capacitor_admittance(self.capacitance, omega)
    }
}

/// DP discretized companion conductance for a capacitance `c`: 2C/Δt + jωC.
/// Shared with `pi_line`, which stamps the same shunt capacitor shape.
pub(crate) fn dp_capacitor_conductance(c: f64, omega: f64, delta_t: f64) -> Complex64 {
    Complex64::new(2.0 * c / delta_t, omega * c)
}

/// SP direct admittance for a capacitance `c`: jωC.
pub(crate) fn sp_capacitor_admittance(c: f64, omega: f64) -> Complex64 {
    Complex64::new(0.0, omega * c)
}

impl Component<Complex64> for PhasorCapacitor {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<Complex64>) -> Result<(), ParameterError> {
        self.node_pos = ctx.terminal_indices[0];
        self.node_neg = ctx.terminal_indices[1];
        self.v_prev = ctx.terminal_nodes[0].voltage()[0] - ctx.terminal_nodes[1].voltage()[0];
        // Steady state at the seeded voltage: current is the admittance's own
        // response to it, regardless of what else the capacitor is wired to
        // (§4.1 item 2).
        let omega = 2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0);
        self.i_prev = self.v_prev * self.sp_admittance(omega);
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, Complex64)> {
        match self.domain {
            Domain::Sp => Vec::new(),
            Domain::Dp => {
                let omega = 2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0);
                let g = self.dp_conductance(omega, delta_t);
                let i_h = -self.i_prev - g * self.v_prev;
                self.last_history = i_h;
                let mut contributions = Vec::with_capacity(2);
                if let Some(pos) = self.node_pos {
                    contributions.push((pos, i_h));
                }
                if let Some(neg) = self.node_neg {
                    contributions.push((neg, -i_h));
                }
                contributions
            }
            Domain::Emt => Vec::new(),
        }
    }

    fn post_step(&mut self, solution: &DVector<Complex64>, delta_t: f64) {
        let pos_v = self.node_pos.map(|p| solution[p]).unwrap_or(Complex64::new(0.0, 0.0));
        let neg_v = self.node_neg.map(|n| solution[n]).unwrap_or(Complex64::new(0.0, 0.0));
        let v_new = pos_v - neg_v;
        if let Domain::Dp = self.domain {
            let omega = 2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0);
            let g = self.dp_conductance(omega, delta_t);
            self.i_prev = self.last_history + g * v_new;
        }
        self.v_prev = v_new;
    }

    fn stamp(&self, matrix: &mut SystemMatrix<Complex64>) {
        let omega = 2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0);
        let y = match self.domain {
            Domain::Sp => self.sp_admittance(omega),
            Domain::Dp => self.dp_conductance(omega, matrix.era().delta_t),
            Domain::Emt => Complex64::new(0.0, 0.0),
        };
        matrix.stamp_conductance(self.node_pos, self.node_neg, y);
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_core::{PhaseType, RhsAccumulator, SystemTopologyBuilder};

    #[test]
    fn sp_capacitor_admittance_matches_analytic_impedance() {
        let c = 1e-6;
        let omega = 2.0 * std::f64::consts::PI * 50.0;
        let mut cap = PhasorCapacitor::new("c1", c, Domain::Sp).unwrap();
        cap.meta.frequencies = vec![50.0];

        let mut builder = SystemTopologyBuilder::<Complex64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("n1").unwrap();
        builder
            .add_component(Box::new(cap), vec!["n1".to_string(), "GND".to_string()])
            .unwrap();
        let topo = builder.build().unwrap();
        let mut matrix = topo.assemble_matrix(1e-3);
        matrix.factorize();

        let mut rhs = RhsAccumulator::<Complex64>::new(topo.matrix_size());
        rhs.inject_current(Some(0), None, Complex64::new(1.0, 0.0));
        let solution = matrix.solve(rhs.as_vector()).unwrap();
        let expected_z = Complex64::new(0.0, -1.0 / (omega * c));
        assert!((solution[0] - expected_z).norm() < 1e-6);
    }
}
