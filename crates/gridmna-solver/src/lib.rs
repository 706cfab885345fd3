//! Time-stepping MNA transient solver and Newton-Raphson power flow.
//!
//! `gridmna-solver` drives a [`gridmna_core::SystemTopology`] built from
//! [`gridmna_components`] elements: [`powerflow`] solves the steady-state
//! operating point, [`init`] hands that solution to a dynamic topology,
//! [`transient`] runs the fixed-Δt MNA loop, [`events`] mutates topology at
//! pre-scheduled times, and [`logger`] records sampled attributes to disk.

pub mod error;
pub mod events;
pub mod init;
pub mod logger;
pub mod powerflow;
pub mod transient;

pub use error::{ConvergenceError, EventError, RuntimeError};
pub use events::{EventOperation, EventSchedule, ScheduledEvent};
pub use init::{collect_voltages, seed_initial_voltages_dp, seed_initial_voltages_emt};
pub use logger::Logger;
pub use powerflow::{BusType, PowerFlowConfig, PowerFlowResult};
pub use transient::{run, RunConfig, RunStatus};
