//! Command-line configuration (§6 "Configuration (CLI)"), mirroring the
//! argument-struct-plus-subcommand shape used across this workspace's CLI
//! entry points.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;

/// Run a hybrid power-system dynamic simulation.
#[derive(Debug, Parser)]
#[command(name = "gridmna", author, version, about, long_about = None)]
pub struct Cli {
    /// Topology files to load (file list; format is left to the loader).
    pub topology: Vec<PathBuf>,

    /// Fixed simulation timestep in seconds (§1 Non-goals: no adaptive
    /// time-stepping).
    #[arg(long = "timestep", default_value_t = 1e-4)]
    pub delta_t: f64,

    /// Simulation duration in seconds.
    #[arg(long = "duration", default_value_t = 1.0)]
    pub final_time: f64,

    /// Seed the dynamic simulation from a converged power-flow solution
    /// before the first transient step (§4.8).
    #[arg(long = "steady-init", default_value_t = false)]
    pub steady_init: bool,

    /// Run name; determines the `logs/<name>/` output directory.
    #[arg(long = "name", default_value = "run")]
    pub run_name: String,

    /// Free-form `key=val` options forwarded to the topology loader.
    #[arg(long = "option", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,
}

impl Cli {
    /// The free-form option bag as a map, per §1.1's `SimulationConfig`.
    pub fn option_map(&self) -> HashMap<String, String> {
        self.options.iter().cloned().collect()
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=val, got '{raw}'")),
    }
}
