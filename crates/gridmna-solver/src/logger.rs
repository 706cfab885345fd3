//! Per-attribute file logger (§6 "Logger output", §2: generalized from
//! `spicier-cli::output`'s tabular printer to one file per registered
//! attribute rather than one table per print request).
//!
//! One file per `(component id, attribute name)` pair lives under
//! `logs/<run_name>/`. Row 0 is a header naming each column; column 0 of
//! every data row is the simulation time in seconds. The logger owns no
//! process-wide state (§9 "Global state": the output directory is a
//! run-scoped resource) and its files close on drop, including during an
//! unwind from a runtime error (§5 "Lifetime").

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use gridmna_core::{MnaScalar, SystemTopology};

struct AttributeSink {
    component_id: String,
    attribute_name: String,
    writer: BufWriter<File>,
}

/// Opens one file per exposed attribute across every component in a
/// topology and writes one row per [`Logger::sample`] call.
pub struct Logger {
    sinks: Vec<AttributeSink>,
}

impl Logger {
    /// Create `logs/<run_name>/` and open one file per component attribute.
    pub fn new<T: MnaScalar>(run_name: &str, topology: &SystemTopology<T>) -> io::Result<Self> {
        let dir = PathBuf::from("logs").join(run_name);
        fs::create_dir_all(&dir)?;

        let mut sinks = Vec::new();
        for indexed in topology.components() {
            let meta = indexed.component.meta();
            for attr in indexed.component.attributes().iter() {
                let file_name = format!("{}.{}.csv", meta.id, attr.name());
                let file = File::create(dir.join(&file_name))?;
                let mut writer = BufWriter::new(file);
                let header_columns = attr.to_columns().len();
                write!(writer, "time")?;
                for k in 0..header_columns {
                    write!(writer, ",c{k}")?;
                }
                writeln!(writer)?;
                sinks.push(AttributeSink {
                    component_id: meta.id.clone(),
                    attribute_name: attr.name().to_string(),
                    writer,
                });
            }
        }

        Ok(Self { sinks })
    }

    /// Append one row to every open file, reading each component's current
    /// attribute values fresh (called once per step, §4.7 "logger.sample(t)").
    pub fn sample<T: MnaScalar>(&mut self, t: f64, topology: &SystemTopology<T>) -> io::Result<()> {
        for sink in &mut self.sinks {
            let Some(index) = topology.component_index_by_id(&sink.component_id) else {
                continue;
            };
            let meta_components = topology.components();
            let Some(attr) = meta_components[index]
                .component
                .attributes()
                .get(&sink.attribute_name)
            else {
                continue;
            };
            write!(sink.writer, "{t}")?;
            for value in attr.to_columns() {
                write!(sink.writer, ",{value}")?;
            }
            writeln!(sink.writer)?;
        }
        Ok(())
    }

    /// Flush every open file. Called on normal completion and on
    /// cancellation (§5 "Cancellation").
    pub fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.writer.flush()?;
        }
        Ok(())
    }
}
