//! Electrical component models (§4 of the exemplar set): ideal resistor,
//! inductor, capacitor, current/voltage source, switch, pi-line, synchronous
//! generator, and three-winding transformer, each implementing
//! `gridmna_core::Component` for the scalar type its domain requires.

pub mod capacitor;
pub mod inductor;
pub mod pi_line;
pub mod resistor;
pub mod sources;
pub mod switch;
pub mod synchronous_generator;
pub mod transformer3w;
mod two_terminal;
pub mod waveform;

pub use capacitor::{EmtCapacitor, PhasorCapacitor};
pub use inductor::{EmtInductor, PhasorInductor};
pub use pi_line::{EmtPiLine, PhasorPiLine};
pub use resistor::Resistor;
pub use sources::{CurrentSource, VoltageSource};
pub use switch::Switch;
pub use synchronous_generator::{
    GeneratorOperatingPoint, GeneratorParameters, GeneratorRatings, SynchronousGenerator,
};
pub use transformer3w::ThreeWindingTransformer;
pub use waveform::Waveform;
