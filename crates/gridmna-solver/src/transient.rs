//! Time-stepping MNA solver main loop (§4.7), grounded on
//! `spicier-solver::transient::solver::solve_transient`'s per-step shape
//! (assemble, solve, update companion state) but generalized from a single
//! fixed stamper + capacitor/inductor state arrays to the component
//! contract's five-method interface over an arbitrary `SystemTopology`.
//!
//! Pre-steps run sequentially in topology insertion order (§5 "single-
//! threaded, cooperative within one simulation run"). A `rayon`-backed
//! reduction across independent component pre-steps was evaluated and
//! rejected: every component shares its observed voltage/current with its
//! own attribute-table closures through `Rc<Cell<T>>` (§9 "Attribute
//! system" — zero-copy get/set thunks into live component state), and `Rc`
//! cannot cross a thread boundary. `rayon` stays a declared workspace
//! dependency (it is likewise declared but unused in the source this crate
//! descends from) for the coarser-grained parallelism a batched parameter
//! sweep would use, which runs each independently-owned topology to
//! completion on its own thread rather than splitting one topology's
//! component list across threads.

use std::sync::atomic::{AtomicBool, Ordering};

use gridmna_core::{MnaScalar, RhsAccumulator, SystemMatrix, SystemTopology};

use crate::error::RuntimeError;
use crate::events::EventSchedule;
use crate::logger::Logger;

/// How a run ended (§5 "Cancellation": "the run exits cleanly with a
/// 'cancelled' status").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Controls for one solver run.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub delta_t: f64,
    pub final_time: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            delta_t: 1e-4,
            final_time: 1.0,
        }
    }
}

/// Run the transient solver loop to completion or cancellation (§4.7).
///
/// Ordering guarantees (§5): within a step, every component's pre-step
/// completes before the solve; every post-step runs after. Events fire
/// before the LHS is assembled for the step whose timestamp they fall in.
pub fn run<T: MnaScalar>(
    topology: &mut SystemTopology<T>,
    events: &mut EventSchedule,
    logger: &mut Logger,
    config: &RunConfig,
    cancel: &AtomicBool,
) -> Result<RunStatus, RuntimeError> {
    let mut matrix = topology.assemble_matrix(config.delta_t);
    matrix.factorize();
    let mut era_generation = topology.generation();

    let mut t = 0.0;
    while t < config.final_time {
        if cancel.load(Ordering::Relaxed) {
            log::info!("run cancelled at t={t}");
            logger.flush()?;
            return Ok(RunStatus::Cancelled);
        }

        let rhs = accumulate_rhs(topology, config.delta_t, t)?;

        let lhs_stale = events.apply_due(topology, t);
        if lhs_stale || topology.generation() != era_generation {
            log::info!(
                "re-factorizing LHS at t={t} (era {} -> {})",
                era_generation,
                topology.generation()
            );
            matrix = topology.assemble_matrix(config.delta_t);
            matrix.factorize();
            era_generation = topology.generation();
        }

        let solution = matrix.solve(rhs.as_vector())?;
        topology.write_solution(&solution);

        for indexed in topology.components_mut() {
            indexed.component.post_step(&solution, config.delta_t);
        }

        logger.sample(t, topology)?;
        t += config.delta_t;
    }

    logger.flush()?;
    log::info!("run completed at t={t}");
    Ok(RunStatus::Completed)
}

/// Gather every component's pre-step RHS contribution in topology insertion
/// order. Non-finite entries are attributed to the component that produced
/// them (§7 "runtime numeric error ... fatal with component id").
fn accumulate_rhs<T: MnaScalar>(
    topology: &mut SystemTopology<T>,
    delta_t: f64,
    t: f64,
) -> Result<RhsAccumulator<T>, RuntimeError> {
    let size = topology.matrix_size();
    let mut rhs = RhsAccumulator::<T>::new(size);
    for indexed in topology.components_mut() {
        let contributions = indexed.component.pre_step(delta_t);
        if let Some(&(_, value)) = contributions.iter().find(|(_, v)| !v.is_finite_value()) {
            let _ = value;
            return Err(RuntimeError::NonFiniteRhs {
                time: t,
                component_id: indexed.component.meta().id.clone(),
            });
        }
        rhs.accumulate(&contributions);
    }
    Ok(rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_components::{EmtInductor, Resistor};
    use gridmna_core::{Domain, PhaseType, SystemTopologyBuilder};

    fn build_rl_topology() -> SystemTopology<f64> {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Abc);
        builder.add_node("n1").unwrap();
        builder
            .add_component(
                Box::new(EmtInductor::new("l1", 1e-2).unwrap()),
                vec!["n1".to_string(), "GND".to_string()],
            )
            .unwrap();
        builder
            .add_component(
                Box::new(Resistor::new("r1", 10.0, Domain::Emt).unwrap()),
                vec!["n1".to_string(), "GND".to_string()],
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn run_completes_and_advances_time() {
        let mut topo = build_rl_topology();
        let mut events = EventSchedule::new(Vec::new());
        let logger_dir = "transient_unit_test";
        let mut logger = Logger::new(logger_dir, &topo).unwrap();
        let config = RunConfig {
            delta_t: 1e-3,
            final_time: 5e-3,
        };
        let cancel = AtomicBool::new(false);

        let status = run(&mut topo, &mut events, &mut logger, &config, &cancel).unwrap();
        assert_eq!(status, RunStatus::Completed);

        std::fs::remove_dir_all(std::path::PathBuf::from("logs").join(logger_dir)).ok();
    }

    #[test]
    fn run_reports_cancelled_status_when_flag_is_set() {
        let mut topo = build_rl_topology();
        let mut events = EventSchedule::new(Vec::new());
        let logger_dir = "transient_unit_test_cancel";
        let mut logger = Logger::new(logger_dir, &topo).unwrap();
        let config = RunConfig {
            delta_t: 1e-3,
            final_time: 1.0,
        };
        let cancel = AtomicBool::new(true);

        let status = run(&mut topo, &mut events, &mut logger, &config, &cancel).unwrap();
        assert_eq!(status, RunStatus::Cancelled);

        std::fs::remove_dir_all(std::path::PathBuf::from("logs").join(logger_dir)).ok();
    }
}
