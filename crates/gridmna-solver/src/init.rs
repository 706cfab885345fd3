//! Power-flow -> dynamic-simulation handoff (§4.8), grounded on
//! `spicier-cli::analysis::transient::run_transient`'s DC-to-transient
//! solution handoff: seed every dynamic node's initial voltage from a
//! converged steady-state solve before the first transient step, then
//! re-initialize every dynamic component from those seeded voltages so its
//! companion-model state (history currents, not just terminal voltage)
//! starts in the matching steady state.
//!
//! Split by target domain the same way the component models are split
//! (`EmtInductor`/`PhasorInductor`): the EMT path phase-expands each phasor
//! into a three-phase abc triple, the DP path copies the phasor directly.

use std::collections::HashMap;

use gridmna_core::{symmetric_abc_embedding, ParameterError, SystemTopology};
use num_complex::Complex64;

/// Build a `node name -> voltage` map from a converged SP topology, keyed
/// the same way [`seed_initial_voltages_emt`]/[`seed_initial_voltages_dp`]
/// look values up.
pub fn collect_voltages(topology: &SystemTopology<Complex64>) -> HashMap<String, Complex64> {
    topology
        .nodes()
        .iter()
        .filter(|n| n.matrix_index().is_some())
        .map(|n| (n.name().to_string(), n.voltage()[0]))
        .collect()
}

/// Seed a DP topology's initial node voltages by copying matching PF
/// phasors directly, then re-run every component's `initialize` against the
/// seeded voltages so companion-model state starts consistent with them
/// (§4.8).
pub fn seed_initial_voltages_dp(
    pf_voltages: &HashMap<String, Complex64>,
    dynamic: &mut SystemTopology<Complex64>,
    delta_t: f64,
) -> Result<(), ParameterError> {
    for node in dynamic.nodes_mut() {
        if let Some(&v) = pf_voltages.get(node.name()) {
            node.set_initial_voltage(vec![v]);
        }
    }
    dynamic.reinitialize_components(delta_t)
}

/// Seed an EMT topology's initial node voltages by phase-expanding each
/// matching PF phasor at t=0 via the symmetric abc embedding (§4.8 "phase-
/// expanded for ABC domain via the symmetric abc embedding"), then re-run
/// every component's `initialize` against the seeded voltages.
pub fn seed_initial_voltages_emt(
    pf_voltages: &HashMap<String, Complex64>,
    dynamic: &mut SystemTopology<f64>,
    omega: f64,
    delta_t: f64,
) -> Result<(), ParameterError> {
    for node in dynamic.nodes_mut() {
        if let Some(&v) = pf_voltages.get(node.name()) {
            let abc = symmetric_abc_embedding(v, omega, 0.0);
            node.set_initial_voltage(vec![abc.x, abc.y, abc.z]);
        }
    }
    dynamic.reinitialize_components(delta_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_components::Resistor;
    use gridmna_core::{Domain, PhaseType, SystemTopologyBuilder};

    #[test]
    fn abc_node_is_seeded_from_pf_phasor() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-4, PhaseType::Abc);
        builder.add_node("bus1").unwrap();
        builder
            .add_component(
                Box::new(Resistor::new("r1", 10.0, Domain::Emt).unwrap()),
                vec!["bus1".to_string(), "GND".to_string()],
            )
            .unwrap();
        let mut dynamic = builder.build().unwrap();

        let mut pf = HashMap::new();
        pf.insert("bus1".to_string(), Complex64::new(1.0, 0.0));
        seed_initial_voltages_emt(&pf, &mut dynamic, 2.0 * std::f64::consts::PI * 50.0, 1e-4).unwrap();

        let node = dynamic
            .nodes()
            .iter()
            .find(|n| n.name() == "bus1")
            .unwrap();
        assert!((node.initial_voltage()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_node_is_seeded_with_phasor_directly() {
        let mut builder = SystemTopologyBuilder::<Complex64>::new(50.0, 1e-4, PhaseType::Single);
        builder.add_node("bus1").unwrap();
        builder
            .add_component(
                Box::new(Resistor::new("r1", 10.0, Domain::Sp).unwrap()),
                vec!["bus1".to_string(), "GND".to_string()],
            )
            .unwrap();
        let mut dynamic = builder.build().unwrap();

        let mut pf = HashMap::new();
        pf.insert("bus1".to_string(), Complex64::new(0.95, 0.1));
        seed_initial_voltages_dp(&pf, &mut dynamic, 1e-4).unwrap();

        let node = dynamic
            .nodes()
            .iter()
            .find(|n| n.name() == "bus1")
            .unwrap();
        assert_eq!(node.initial_voltage()[0], Complex64::new(0.95, 0.1));
    }
}
