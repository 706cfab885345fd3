//! Pi-equivalent line (§4.5 neighbor shape, generalized from the
//! resistor/inductor/capacitor companion models): series R-L between the two
//! terminals through an owned virtual junction node, with half the line's
//! shunt capacitance to ground at each end.
//!
//! Split into EMT and phasor variants for the same reason as the inductor
//! and capacitor: the DP carrier-shifted companion form needs the imaginary
//! unit, which has no generic expression over `T: MnaScalar`.

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    recover_phasor_from_abc, symmetric_abc_embedding, Attribute, AttributeTable, Component,
    ComponentMeta, Domain, InitContext, ParameterError, SystemMatrix,
};
use nalgebra::{DVector, Vector3};
use num_complex::Complex64;

use crate::capacitor::{dp_capacitor_conductance, sp_capacitor_admittance};
use crate::inductor::{dp_inductor_conductance, sp_inductor_admittance};

fn validate_line_params(
    id: &str,
    resistance: f64,
    inductance: f64,
    capacitance: f64,
) -> Result<(), ParameterError> {
    for (value, name) in [
        (resistance, "resistance"),
        (inductance, "inductance"),
        (capacitance, "capacitance"),
    ] {
        if !value.is_finite() {
            return Err(ParameterError::NonFinite {
                component: id.to_string(),
                parameter: name.to_string(),
            });
        }
        if value < 0.0 {
            return Err(ParameterError::Negative {
                component: id.to_string(),
                parameter: name.to_string(),
                value,
            });
        }
    }
    Ok(())
}

/// Per-phase trapezoidal companion state shared by the line's series
/// inductor and two shunt capacitors.
#[derive(Debug, Clone, Copy, Default)]
struct Companion {
    i_prev: f64,
    v_prev: f64,
    last_history: f64,
}

/// Three-phase real pi-line: R-L in series through a junction virtual node,
/// C/2 shunt at each terminal.
#[derive(Debug)]
pub struct EmtPiLine {
    meta: ComponentMeta,
    resistance: f64,
    inductance: f64,
    capacitance: f64,
    base_a: Option<usize>,
    base_b: Option<usize>,
    junction_base: usize,
    inductor: [Companion; 3],
    shunt_a: [Companion; 3],
    shunt_b: [Companion; 3],
    current: Rc<Cell<f64>>,
    attrs: AttributeTable,
}

impl EmtPiLine {
    pub fn new(
        id: impl Into<String>,
        resistance: f64,
        inductance: f64,
        capacitance: f64,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        validate_line_params(&id, resistance, inductance, capacitance)?;

        let current = Rc::new(Cell::new(0.0));
        let mut attrs = AttributeTable::new();
        let read_current = current.clone();
        attrs.register(Attribute::read_only("current_a", move || {
            gridmna_core::AttributeValue::Real(read_current.get())
        }));

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 1,
                frequencies: Vec::new(),
                domain: Domain::Emt,
            },
            resistance,
            inductance,
            capacitance,
            base_a: None,
            base_b: None,
            junction_base: 0,
            inductor: [Companion::default(); 3],
            shunt_a: [Companion::default(); 3],
            shunt_b: [Companion::default(); 3],
            current,
            attrs,
        })
    }

    fn inductor_g(&self, delta_t: f64) -> f64 {
        delta_t / (2.0 * self.inductance)
    }

    fn shunt_g(&self, delta_t: f64) -> f64 {
        2.0 * (self.capacitance / 2.0) / delta_t
    }
}

impl Component<f64> for EmtPiLine {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<f64>) -> Result<(), ParameterError> {
        self.base_a = ctx.terminal_indices[0];
        self.base_b = ctx.terminal_indices[1];
        self.junction_base = ctx.virtual_indices[0];
        for phase in 0..3 {
            let v_a = ctx.terminal_nodes[0].voltage()[phase];
            let v_b = ctx.terminal_nodes[1].voltage()[phase];
            self.shunt_a[phase].v_prev = v_a;
            self.shunt_b[phase].v_prev = v_b;
            self.inductor[phase].v_prev = v_a - v_b;
        }

        // Recover the phasors the seeded terminal voltages carry and derive
        // the steady-state current through each companion element at that
        // phasor and the nominal frequency (§4.1 item 2). The series
        // inductor and series resistor share one current by KCL at the
        // junction node, so the same value seeds the inductor's companion.
        let omega = 2.0 * std::f64::consts::PI * ctx.nominal_frequency;
        if omega > 0.0 {
            let half_c = self.capacitance / 2.0;
            let v_a_phasor = recover_phasor_from_abc(Vector3::new(
                self.shunt_a[0].v_prev,
                self.shunt_a[1].v_prev,
                self.shunt_a[2].v_prev,
            ));
            let v_b_phasor = recover_phasor_from_abc(Vector3::new(
                self.shunt_b[0].v_prev,
                self.shunt_b[1].v_prev,
                self.shunt_b[2].v_prev,
            ));
            let v_l_phasor = recover_phasor_from_abc(Vector3::new(
                self.inductor[0].v_prev,
                self.inductor[1].v_prev,
                self.inductor[2].v_prev,
            ));

            let i_ca = symmetric_abc_embedding(
                v_a_phasor * sp_capacitor_admittance(half_c, omega),
                omega,
                0.0,
            );
            let i_cb = symmetric_abc_embedding(
                v_b_phasor * sp_capacitor_admittance(half_c, omega),
                omega,
                0.0,
            );
            for phase in 0..3 {
                self.shunt_a[phase].i_prev = [i_ca.x, i_ca.y, i_ca.z][phase];
                self.shunt_b[phase].i_prev = [i_cb.x, i_cb.y, i_cb.z][phase];
            }

            if self.inductance > 0.0 {
                let i_l = symmetric_abc_embedding(
                    v_l_phasor / Complex64::new(0.0, omega * self.inductance),
                    omega,
                    0.0,
                );
                for phase in 0..3 {
                    self.inductor[phase].i_prev = [i_l.x, i_l.y, i_l.z][phase];
                }
            }
        }
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, f64)> {
        let g_l = self.inductor_g(delta_t);
        let g_c = self.shunt_g(delta_t);
        let mut contributions = Vec::with_capacity(12);
        for phase in 0..3 {
            let i_h = self.inductor[phase].i_prev + g_l * self.inductor[phase].v_prev;
            self.inductor[phase].last_history = i_h;
            contributions.push((self.junction_base + phase, i_h));
            if let Some(b) = self.base_b {
                contributions.push((b + phase, -i_h));
            }

            let i_ha = -self.shunt_a[phase].i_prev - g_c * self.shunt_a[phase].v_prev;
            self.shunt_a[phase].last_history = i_ha;
            if let Some(a) = self.base_a {
                contributions.push((a + phase, i_ha));
            }

            let i_hb = -self.shunt_b[phase].i_prev - g_c * self.shunt_b[phase].v_prev;
            self.shunt_b[phase].last_history = i_hb;
            if let Some(b) = self.base_b {
                contributions.push((b + phase, i_hb));
            }
        }
        contributions
    }

    fn post_step(&mut self, solution: &DVector<f64>, delta_t: f64) {
        let g_l = self.inductor_g(delta_t);
        let g_c = self.shunt_g(delta_t);
        for phase in 0..3 {
            let v_a = self.base_a.map(|a| solution[a + phase]).unwrap_or(0.0);
            let v_b = self.base_b.map(|b| solution[b + phase]).unwrap_or(0.0);
            let v_j = solution[self.junction_base + phase];

            let v_l_new = v_j - v_b;
            let i_l_new = self.inductor[phase].last_history + g_l * v_l_new;
            self.inductor[phase].i_prev = i_l_new;
            self.inductor[phase].v_prev = v_l_new;

            let i_ca_new = self.shunt_a[phase].last_history + g_c * v_a;
            self.shunt_a[phase].i_prev = i_ca_new;
            self.shunt_a[phase].v_prev = v_a;

            let i_cb_new = self.shunt_b[phase].last_history + g_c * v_b;
            self.shunt_b[phase].i_prev = i_cb_new;
            self.shunt_b[phase].v_prev = v_b;
        }
        self.current.set(self.inductor[0].i_prev);
    }

    fn stamp(&self, matrix: &mut SystemMatrix<f64>) {
        let delta_t = matrix.era().delta_t;
        let g_r = 1.0 / self.resistance;
        let g_l = self.inductor_g(delta_t);
        let g_c = self.shunt_g(delta_t);
        for phase in 0..3 {
            let a = self.base_a.map(|b| b + phase);
            let b = self.base_b.map(|b| b + phase);
            let j = self.junction_base + phase;
            matrix.stamp_conductance(a, Some(j), g_r);
            matrix.stamp_conductance(Some(j), b, g_l);
            matrix.stamp_conductance(a, None, g_c);
            matrix.stamp_conductance(b, None, g_c);
        }
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}

/// Complex-domain pi-line serving SP (direct admittance) and DP
/// (carrier-shifted discretized companion).
pub struct PhasorPiLine {
    meta: ComponentMeta,
    resistance: f64,
    inductance: f64,
    capacitance: f64,
    domain: Domain,
    node_a: Option<usize>,
    node_b: Option<usize>,
    junction: usize,
    l_companion: Companion2,
    attrs: AttributeTable,
}

#[derive(Debug, Clone, Copy, Default)]
struct Companion2 {
    i_prev: Complex64,
    v_prev: Complex64,
    last_history: Complex64,
}

impl PhasorPiLine {
    pub fn new(
        id: impl Into<String>,
        resistance: f64,
        inductance: f64,
        capacitance: f64,
        domain: Domain,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        validate_line_params(&id, resistance, inductance, capacitance)?;
        if !matches!(domain, Domain::Sp | Domain::Dp) {
            return Err(ParameterError::UnsupportedVariant {
                component: id,
                variant: "phasor pi-line requires SP or DP domain".to_string(),
            });
        }

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 1,
                frequencies: Vec::new(),
                domain,
            },
            resistance,
            inductance,
            capacitance,
            domain,
            node_a: None,
            node_b: None,
            junction: 0,
            l_companion: Companion2::default(),
            attrs: AttributeTable::new(),
        })
    }

    fn omega(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0)
    }

    fn l_conductance(&self, delta_t: f64) -> Complex64 {
        match self.domain {
            Domain::Sp => sp_inductor_admittance(self.inductance, self.omega()),
            Domain::Dp => dp_inductor_conductance(self.inductance, self.omega(), delta_t),
            Domain::Emt => Complex64::new(0.0, 0.0),
        }
    }

    fn shunt_admittance(&self, delta_t: f64) -> Complex64 {
        let half_c = self.capacitance / 2.0;
        match self.domain {
            Domain::Sp => sp_capacitor_admittance(half_c, self.omega()),
            Domain::Dp => dp_capacitor_conductance(half_c, self.omega(), delta_t),
            Domain::Emt => Complex64::new(0.0, 0.0),
        }
    }
}

impl Component<Complex64> for PhasorPiLine {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<Complex64>) -> Result<(), ParameterError> {
        self.node_a = ctx.terminal_indices[0];
        self.node_b = ctx.terminal_indices[1];
        self.junction = ctx.virtual_indices[0];
        let v_a = ctx.terminal_nodes[0].voltage()[0];
        let v_b = ctx.terminal_nodes[1].voltage()[0];
        self.l_companion.v_prev = v_a - v_b;
        self.l_companion.i_prev =
            self.l_companion.v_prev * sp_inductor_admittance(self.inductance, self.omega());
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, Complex64)> {
        if let Domain::Dp = self.domain {
            let g_l = self.l_conductance(delta_t);
            let i_h = self.l_companion.i_prev + g_l * self.l_companion.v_prev;
            self.l_companion.last_history = i_h;
            let mut contributions = Vec::with_capacity(2);
            contributions.push((self.junction, i_h));
            if let Some(b) = self.node_b {
                contributions.push((b, -i_h));
            }
            contributions
        } else {
            Vec::new()
        }
    }

    fn post_step(&mut self, solution: &DVector<Complex64>, delta_t: f64) {
        let v_b = self
            .node_b
            .map(|b| solution[b])
            .unwrap_or(Complex64::new(0.0, 0.0));
        let v_j = solution[self.junction];
        let v_l_new = v_j - v_b;
        if let Domain::Dp = self.domain {
            let g_l = self.l_conductance(delta_t);
            self.l_companion.i_prev = self.l_companion.last_history + g_l * v_l_new;
        }
        self.l_companion.v_prev = v_l_new;
    }

    fn stamp(&self, matrix: &mut SystemMatrix<Complex64>) {
        let delta_t = matrix.era().delta_t;
        let g_r = Complex64::new(1.0 / self.resistance, 0.0);
        let g_l = self.l_conductance(delta_t);
        let g_c = self.shunt_admittance(delta_t);
        matrix.stamp_conductance(self.node_a, Some(self.junction), g_r);
        matrix.stamp_conductance(Some(self.junction), self.node_b, g_l);
        matrix.stamp_conductance(self.node_a, None, g_c);
        matrix.stamp_conductance(self.node_b, None, g_c);
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
    fn sp_pi_line_series_impedance_matches_rl_at_dc_shunt_open() {
        // With the shunt admittance's frequency component dominant but the
        // line's R+jwL in series, injecting current at node a and reading
        // back through the R-L branch should match Ohm's law on the series
        // impedance alone once the shunt leakage is negligible compared to
        // the injected current path (Sp: shunt is jwC, still present, so we
        // just sanity-check the matrix solves and the line carries current).
        let mut builder = SystemTopologyBuilder::<Complex64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("a").unwrap();
        builder.add_node("b").unwrap();
        let mut line = PhasorPiLine::new("line1", 1.0, 0.01, 1e-6, Domain::Sp).unwrap();
        line.meta.frequencies = vec![50.0];
        builder
            .add_component(Box::new(line), vec!["a".to_string(), "b".to_string()])
            .unwrap();
        builder
            .add_component(
                Box::new(crate::resistor::Resistor::<Complex64>::new("rload", 100.0, Domain::Sp).unwrap()),
                vec!["b".to_string(), "GND".to_string()],
            )
            .unwrap();
        let topo = builder.build().unwrap();
        let mut matrix = topo.assemble_matrix(1e-3);
        matrix.factorize();
        let mut rhs = RhsAccumulator::<Complex64>::new(topo.matrix_size());
        rhs.inject_current(Some(0), None, Complex64::new(1.0, 0.0));
        let solution = matrix.solve(rhs.as_vector()).unwrap();
        assert!(solution[0].norm() > 0.0);
        assert!(solution[0].norm().is_finite());
    }

    #[test]
    fn rejects_negative_capacitance() {
        let err = EmtPiLine::new("line1", 1.0, 0.01, -1e-6).unwrap_err();
        assert!(matches!(err, ParameterError::Negative { .. }));
    }
}
