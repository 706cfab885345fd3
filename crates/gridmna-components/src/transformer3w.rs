//! Three-winding transformer, SP steady-state (§4.5), grounded on
//! `SP_Ph1_Transformer3W`: a direct 3x3 admittance stamp between the three
//! terminal nodes derived from the star-equivalent of the three leakage
//! impedances, with a snubber conductance on the lowest-voltage winding.
//!
//! Unlike the source, which builds the star-equivalent out of owned
//! sub-resistor/sub-inductor components wired through virtual nodes, this
//! component stamps the reduced 3x3 admittance directly — R_i is folded
//! into the leakage impedance rather than kept as a separate series element,
//! so there is no virtual star node and no risk of the source's aliased
//! sub-resistor assignment (§9 open question).

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    Attribute, AttributeTable, AttributeValue, Component, ComponentMeta, Domain, InitContext,
    ParameterError, SystemMatrix,
};
use nalgebra::DVector;
use num_complex::Complex64;

/// Per-winding nameplate and leakage parameters, indexed by the order the
/// windings are supplied to [`ThreeWindingTransformer::new`] (not the
/// internal high-to-low voltage ranking used for the admittance stamp).
#[derive(Debug, Clone, Copy)]
pub struct WindingParameters {
    pub nominal_voltage: f64,
    pub resistance: f64,
    pub inductance: f64,
    pub tap_ratio: Complex64,
}

pub struct ThreeWindingTransformer {
    meta: ComponentMeta,
    windings: [WindingParameters; 3],
    magnetizing_impedance: Option<Complex64>,
    /// `rank_to_terminal[k]` is the winding index (into `windings` and the
    /// constructor's terminal order) occupying the k-th highest-voltage
    /// rank. Rank 0 is highest voltage, rank 2 lowest (swap-order
    /// convention, §4.5).
    rank_to_terminal: [usize; 3],
    snubber_resistance: f64,
    node_index: [Option<usize>; 3],
    currents: [Rc<Cell<Complex64>>; 3],
    attrs: AttributeTable,
}

impl ThreeWindingTransformer {
    pub fn new(
        id: impl Into<String>,
        windings: [WindingParameters; 3],
        magnetizing_impedance: Option<Complex64>,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        for (k, w) in windings.iter().enumerate() {
            for (value, name) in [
                (w.nominal_voltage, "nominal_voltage"),
                (w.resistance, "resistance"),
                (w.inductance, "inductance"),
            ] {
                if !value.is_finite() {
                    return Err(ParameterError::NonFinite {
                        component: format!("{id}::winding{k}"),
                        parameter: name.to_string(),
                    });
                }
                if value < 0.0 {
                    return Err(ParameterError::Negative {
                        component: format!("{id}::winding{k}"),
                        parameter: name.to_string(),
                        value,
                    });
                }
            }
        }

        let mut rank_to_terminal = [0usize, 1, 2];
        rank_to_terminal.sort_by(|&a, &b| {
            windings[b]
                .nominal_voltage
                .partial_cmp(&windings[a].nominal_voltage)
                .unwrap()
        });

        let snubber_resistance = windings
            .iter()
            .map(|w| w.nominal_voltage)
            .fold(f64::INFINITY, f64::min)
            * 1e6;

        let currents: [Rc<Cell<Complex64>>; 3] = [
            Rc::new(Cell::new(Complex64::new(0.0, 0.0))),
            Rc::new(Cell::new(Complex64::new(0.0, 0.0))),
            Rc::new(Cell::new(Complex64::new(0.0, 0.0))),
        ];
        let mut attrs = AttributeTable::new();
        for (k, current) in currents.iter().enumerate() {
            let read = current.clone();
            attrs.register(Attribute::read_only(format!("current_{}", k + 1), move || {
                AttributeValue::Complex(read.get())
            }));
        }

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 3,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain: Domain::Sp,
            },
            windings,
            magnetizing_impedance,
            rank_to_terminal,
            snubber_resistance,
            node_index: [None; 3],
            currents,
            attrs,
        })
    }

    fn omega(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.meta.frequencies.first().copied().unwrap_or(50.0)
    }

    /// The 3x3 admittance stamp, in rank order (rank 0 = highest voltage),
    /// per §4.5's star-equivalent derivation.
    fn admittance_matrix(&self, omega: f64) -> [[Complex64; 3]; 3] {
        let leakage: [Complex64; 3] = std::array::from_fn(|rank| {
            let w = &self.windings[self.rank_to_terminal[rank]];
            Complex64::new(w.resistance, omega * w.inductance)
        });
        let tap: [f64; 3] = std::array::from_fn(|rank| {
            self.windings[self.rank_to_terminal[rank]].tap_ratio.norm()
        });

        let x = [
            leakage[1] * leakage[2] * tap[0],
            leakage[2] * leakage[0] * tap[1],
            leakage[0] * leakage[1] * tap[2],
        ];
        let correction = match self.magnetizing_impedance {
            Some(zm) => leakage[0] * leakage[1] * leakage[2] / zm,
            None => Complex64::new(0.0, 0.0),
        };
        let d = x[0] * tap[0] + x[1] * tap[1] + x[2] * tap[2] + correction;

        std::array::from_fn(|i| {
            std::array::from_fn(|j| {
                if i == j {
                    (d - tap[i] * x[i]) / (leakage[i] * d)
                } else {
                    -tap[i] * x[j] / (leakage[i] * d)
                }
            })
        })
    }
}

impl Component<Complex64> for ThreeWindingTransformer {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<Complex64>) -> Result<(), ParameterError> {
        self.meta.frequencies = vec![ctx.nominal_frequency];
        for rank in 0..3 {
            self.node_index[rank] = ctx.terminal_indices[self.rank_to_terminal[rank]];
        }
        Ok(())
    }

    fn pre_step(&mut self, _delta_t: f64) -> Vec<(usize, Complex64)> {
        Vec::new()
    }

    fn post_step(&mut self, solution: &DVector<Complex64>, _delta_t: f64) {
        let omega = self.omega();
        let y = self.admittance_matrix(omega);
        let v: [Complex64; 3] = std::array::from_fn(|rank| {
            self.node_index[rank]
                .map(|idx| solution[idx])
                .unwrap_or(Complex64::new(0.0, 0.0))
        });
        for rank in 0..3 {
            let current = y[rank][0] * v[0] + y[rank][1] * v[1] + y[rank][2] * v[2];
            self.currents[self.rank_to_terminal[rank]].set(current);
        }
    }

    fn stamp(&self, matrix: &mut SystemMatrix<Complex64>) {
        let omega = self.omega();
        let y = self.admittance_matrix(omega);
        for i in 0..3 {
            let Some(row) = self.node_index[i] else {
                continue;
            };
            for j in 0..3 {
                let Some(col) = self.node_index[j] else {
                    continue;
                };
                matrix.stamp_entry(row, col, y[i][j]);
            }
        }
        if let Some(lowest) = self.node_index[2] {
            matrix.stamp_conductance(
                Some(lowest),
                None,
                Complex64::new(1.0 / self.snubber_resistance, 0.0),
            );
        }
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_core::{PhaseType, RhsAccumulator, SystemTopologyBuilder};

    fn winding(nominal_voltage: f64, resistance: f64, inductance: f64) -> WindingParameters {
        WindingParameters {
            nominal_voltage,
            resistance,
            inductance,
            tap_ratio: Complex64::new(1.0, 0.0),
        }
    }

    #[test]
    fn ranks_windings_by_descending_nominal_voltage() {
        let t = ThreeWindingTransformer::new(
            "t1",
            [
                winding(11e3, 0.01, 1e-3),
                winding(132e3, 0.02, 2e-3),
                winding(33e3, 0.015, 1.5e-3),
            ],
            None,
        )
        .unwrap();
        assert_eq!(t.rank_to_terminal, [1, 2, 0]);
    }

    #[test]
    fn admittance_matrix_is_symmetric_in_shape_and_finite() {
        let t = ThreeWindingTransformer::new(
            "t1",
            [
                winding(132e3, 0.02, 2e-3),
                winding(33e3, 0.015, 1.5e-3),
                winding(11e3, 0.01, 1e-3),
            ],
            None,
        )
        .unwrap();
        let y = t.admittance_matrix(2.0 * std::f64::consts::PI * 50.0);
        for row in &y {
            for entry in row {
                assert!(entry.norm().is_finite());
            }
        }
    }

    #[test]
    fn three_bus_pf_network_solves_without_singularity() {
        let mut builder = SystemTopologyBuilder::<Complex64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("hv").unwrap();
        builder.add_node("mv").unwrap();
        builder.add_node("lv").unwrap();
        let transformer = ThreeWindingTransformer::new(
            "t1",
            [
                winding(132e3, 1.0, 0.1),
                winding(33e3, 0.5, 0.05),
                winding(11e3, 0.2, 0.02),
            ],
            None,
        )
        .unwrap();
        builder
            .add_component(
                Box::new(transformer),
                vec!["hv".to_string(), "mv".to_string(), "lv".to_string()],
            )
            .unwrap();
        let topo = builder.build().unwrap();
        let mut matrix = topo.assemble_matrix(1e-3);
        matrix.factorize();
        let mut rhs = RhsAccumulator::<Complex64>::new(topo.matrix_size());
        rhs.inject_current(Some(0), None, Complex64::new(1.0, 0.0));
        let solution = matrix.solve(rhs.as_vector()).unwrap();
        assert!(solution.iter().all(|v| v.norm().is_finite()));
    }
}
