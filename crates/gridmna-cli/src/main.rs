//! Command-line entry point: load a topology, optionally seed it from a
//! converged power-flow solution, and run the transient loop to completion.

mod config;
mod loader;

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::Parser;
use gridmna_solver::{powerflow, EventSchedule, Logger, RunConfig, RunStatus};

use config::Cli;
use loader::{JsonOverlayLoader, TopologyLoader};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let files: Vec<&std::path::Path> = cli.topology.iter().map(|p| p.as_path()).collect();
    let loader = JsonOverlayLoader;
    let mut topology = loader.load(&files, &cli.option_map())?;

    if cli.steady_init {
        let (mut pf_topology, buses) = loader.load_power_flow(&files, &cli.option_map())?;
        let y_bus = pf_topology.assemble_matrix(cli.delta_t).as_dense().clone();
        let pf_result = powerflow::solve(&y_bus, &buses, powerflow::PowerFlowConfig::default())?;
        log::info!(
            "--steady-init: power flow converged in {} iterations, max mismatch {:.3e}",
            pf_result.iterations,
            pf_result.max_mismatch
        );
        pf_topology.write_solution(&nalgebra::DVector::from_vec(pf_result.voltages));
        let pf_voltages = gridmna_solver::collect_voltages(&pf_topology);

        let omega = 2.0 * std::f64::consts::PI * topology.nominal_frequency();
        gridmna_solver::seed_initial_voltages_emt(&pf_voltages, &mut topology, omega, cli.delta_t)?;
    }

    let mut events = EventSchedule::new(Vec::new());
    let mut logger = Logger::new(&cli.run_name, &topology)?;
    let run_config = RunConfig {
        delta_t: cli.delta_t,
        final_time: cli.final_time,
    };
    let cancel = AtomicBool::new(false);

    let status = gridmna_solver::run(
        &mut topology,
        &mut events,
        &mut logger,
        &run_config,
        &cancel,
    )?;

    match status {
        RunStatus::Completed => {
            println!("run '{}' completed at t={}", cli.run_name, cli.final_time);
        }
        RunStatus::Cancelled => {
            println!("run '{}' cancelled", cli.run_name);
        }
    }
    Ok(())
}
