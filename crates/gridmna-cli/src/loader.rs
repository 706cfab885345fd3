//! Topology loading (§6 "Topology input"). The abstract loader boundary is
//! an external collaborator per the stated Non-goal ("CIM/XML topology
//! importers and JSON configuration loaders" are out of scope for the
//! core); this crate supplies only a minimal JSON-overlay loader for smoke
//! use and tests, not a CIM importer.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use gridmna_components::switch::G_ON;
use gridmna_components::{EmtInductor, PhasorInductor, Resistor, Switch};
use gridmna_core::{Domain, PhaseType, SystemTopology, SystemTopologyBuilder};
use gridmna_solver::BusType;
use num_complex::Complex64;
use serde::Deserialize;

/// Resolves a topology from the external sources named on the command
/// line. Concrete loaders (CIM XML, CSV load schedules, full JSON parameter
/// overlays) live outside this core crate; this trait is the seam they
/// would implement against.
pub trait TopologyLoader {
    fn load(
        &self,
        files: &[&Path],
        options: &HashMap<String, String>,
    ) -> Result<SystemTopology<f64>>;

    /// Build the companion SP power-flow topology and per-bus boundary
    /// conditions (§4.8) used to seed `--steady-init`, in the same node
    /// order as [`TopologyLoader::load`]'s dynamic topology. Loaders that
    /// have no power-flow model to offer return an error; this is the
    /// default.
    fn load_power_flow(
        &self,
        _files: &[&Path],
        _options: &HashMap<String, String>,
    ) -> Result<(SystemTopology<Complex64>, Vec<BusType>)> {
        anyhow::bail!("this loader has no power-flow model to seed --steady-init from")
    }
}

/// A minimal EMT topology loader reading a single small JSON document.
/// Supports exactly the exemplar component set named in §1's out-of-scope
/// note (resistor, inductor, switch) for smoke runs and tests — it is
/// deliberately not a general netlist format.
pub struct JsonOverlayLoader;

#[derive(Debug, Deserialize)]
struct TopologyDocument {
    nominal_frequency: f64,
    nodes: Vec<String>,
    components: Vec<ComponentDocument>,
    /// Optional companion steady-state model (§4.8), read only by
    /// `load_power_flow` for `--steady-init`. Absent for topology files that
    /// only ever run from a flat start.
    power_flow: Option<PowerFlowDocument>,
}

#[derive(Debug, Deserialize)]
struct PowerFlowDocument {
    /// One entry per node in `nodes`, same order.
    buses: Vec<PfBusDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PfBusDocument {
    Slack {
        voltage_magnitude: f64,
        voltage_angle_deg: f64,
    },
    Pv {
        active_power: f64,
        voltage_magnitude: f64,
    },
    Pq {
        active_power: f64,
        reactive_power: f64,
    },
}

impl PfBusDocument {
    fn into_bus_type(self) -> BusType {
        match self {
            PfBusDocument::Slack {
                voltage_magnitude,
                voltage_angle_deg,
            } => BusType::Slack {
                voltage: Complex64::from_polar(voltage_magnitude, voltage_angle_deg.to_radians()),
            },
            PfBusDocument::Pv {
                active_power,
                voltage_magnitude,
            } => BusType::Pv {
                active_power,
                voltage_magnitude,
            },
            PfBusDocument::Pq {
                active_power,
                reactive_power,
            } => BusType::Pq {
                active_power,
                reactive_power,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ComponentDocument {
    Resistor {
        id: String,
        resistance: f64,
        terminals: [String; 2],
    },
    Inductor {
        id: String,
        inductance: f64,
        terminals: [String; 2],
    },
    Switch {
        id: String,
        closed: bool,
        terminals: [String; 2],
    },
}

impl TopologyLoader for JsonOverlayLoader {
    fn load(
        &self,
        files: &[&Path],
        _options: &HashMap<String, String>,
    ) -> Result<SystemTopology<f64>> {
        let path = files
            .first()
            .context("JsonOverlayLoader requires exactly one topology file")?;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading topology file {}", path.display()))?;
        let doc: TopologyDocument =
            serde_json::from_str(&raw).context("parsing topology JSON overlay")?;

        let delta_t = 1e-4; // the builder's delta_t only seeds companion-model baking at initialize time; the run loop re-assembles at the CLI's configured timestep.
        let mut builder =
            SystemTopologyBuilder::<f64>::new(doc.nominal_frequency, delta_t, PhaseType::Abc);
        for node in &doc.nodes {
            builder.add_node(node.clone())?;
        }
        for component in doc.components {
            match component {
                ComponentDocument::Resistor {
                    id,
                    resistance,
                    terminals,
                } => {
                    let device = Resistor::<f64>::new(id, resistance, Domain::Emt)?;
                    builder.add_component(Box::new(device), terminals.to_vec())?;
                }
                ComponentDocument::Inductor {
                    id,
                    inductance,
                    terminals,
                } => {
                    let device = EmtInductor::new(id, inductance)?;
                    builder.add_component(Box::new(device), terminals.to_vec())?;
                }
                ComponentDocument::Switch {
                    id,
                    closed,
                    terminals,
                } => {
                    let device = Switch::<f64>::new(id, Domain::Emt, closed);
                    builder.add_component(Box::new(device), terminals.to_vec())?;
                }
            }
        }
        Ok(builder.build()?)
    }

    fn load_power_flow(
        &self,
        files: &[&Path],
        _options: &HashMap<String, String>,
    ) -> Result<(SystemTopology<Complex64>, Vec<BusType>)> {
        let path = files
            .first()
            .context("JsonOverlayLoader requires exactly one topology file")?;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading topology file {}", path.display()))?;
        let doc: TopologyDocument =
            serde_json::from_str(&raw).context("parsing topology JSON overlay")?;

        let power_flow = doc
            .power_flow
            .context("topology file has no \"power_flow\" section; required for --steady-init")?;
        ensure!(
            power_flow.buses.len() == doc.nodes.len(),
            "power_flow.buses must have exactly one entry per node, in the same order as \"nodes\""
        );

        let delta_t = 1e-4;
        let mut builder =
            SystemTopologyBuilder::<Complex64>::new(doc.nominal_frequency, delta_t, PhaseType::Single);
        for node in &doc.nodes {
            builder.add_node(node.clone())?;
        }
        for component in &doc.components {
            match component {
                ComponentDocument::Resistor {
                    id,
                    resistance,
                    terminals,
                } => {
                    let device = Resistor::<Complex64>::new(id.clone(), *resistance, Domain::Sp)?;
                    builder.add_component(Box::new(device), terminals.to_vec())?;
                }
                ComponentDocument::Inductor {
                    id,
                    inductance,
                    terminals,
                } => {
                    let device = PhasorInductor::new(id.clone(), *inductance, Domain::Sp)?;
                    builder.add_component(Box::new(device), terminals.to_vec())?;
                }
                ComponentDocument::Switch {
                    id,
                    closed,
                    terminals,
                } => {
                    if *closed {
                        let device = Resistor::<Complex64>::new(id.clone(), 1.0 / G_ON, Domain::Sp)?;
                        builder.add_component(Box::new(device), terminals.to_vec())?;
                    } else {
                        log::info!("open switch '{id}' carries no power-flow branch");
                    }
                }
            }
        }
        let topology = builder.build()?;
        let buses = power_flow
            .buses
            .into_iter()
            .map(PfBusDocument::into_bus_type)
            .collect();
        Ok((topology, buses))
    }
}
