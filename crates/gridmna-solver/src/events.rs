//! Event schedule (§6 "Event schedule input", §4.7, §9 "Event loop"): a
//! time-ordered sequence of operations applied at step boundaries, consumed
//! without any callback/closure scheduling runtime.

use gridmna_core::{AttributeValue, MnaScalar, SystemTopology};

use crate::error::EventError;

/// One scheduled mutation of a component, applied once its timestamp has
/// been reached (§6).
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: f64,
    pub component_id: String,
    pub operation: EventOperation,
}

#[derive(Debug, Clone)]
pub enum EventOperation {
    Open,
    Close,
    SetParameter { name: String, value: AttributeValue },
}

/// A time-ordered event schedule. Sorted once at construction so the solver
/// can consume it by advancing a cursor (§9: "keep events in a time-ordered
/// sequence consumed at each step boundary").
pub struct EventSchedule {
    events: Vec<ScheduledEvent>,
    cursor: usize,
}

impl EventSchedule {
    pub fn new(mut events: Vec<ScheduledEvent>) -> Self {
        events.sort_by(|a, b| a.time.partial_cmp(&b.time).expect("event time is not NaN"));
        Self { events, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Apply every event with `time <= t` that has not yet been applied,
    /// returning whether any of them require the LHS to be re-assembled
    /// (i.e. a switch changed state). Unknown component ids, or parameter
    /// names the target component doesn't expose, are logged and skipped
    /// (§7 "Event error": non-fatal).
    pub fn apply_due<T: MnaScalar>(&mut self, topology: &mut SystemTopology<T>, t: f64) -> bool {
        let mut lhs_stale = false;
        while self.cursor < self.events.len() && self.events[self.cursor].time <= t {
            let event = self.events[self.cursor].clone();
            match apply_one(topology, &event) {
                Ok(changed) => lhs_stale |= changed,
                Err(err) => log::warn!("skipping event: {err}"),
            }
            self.cursor += 1;
        }
        lhs_stale
    }
}

fn apply_one<T: MnaScalar>(
    topology: &mut SystemTopology<T>,
    event: &ScheduledEvent,
) -> Result<bool, EventError> {
    let index = topology
        .component_index_by_id(&event.component_id)
        .ok_or_else(|| EventError {
            time: event.time,
            component_id: event.component_id.clone(),
        })?;

    let component = &mut topology.components_mut()[index].component;
    let changed = apply_operation(component.as_mut(), event)?;
    if changed {
        topology.bump_generation();
    }

    log::info!(
        "applied event at t={} to component '{}': {:?}",
        event.time,
        event.component_id,
        event.operation
    );
    Ok(changed)
}

fn apply_operation<T: MnaScalar>(
    component: &mut dyn gridmna_core::Component<T>,
    event: &ScheduledEvent,
) -> Result<bool, EventError> {
    let changed = match &event.operation {
        EventOperation::Open => match component.as_switchable_mut() {
            Some(switchable) => switchable.open(),
            None => {
                log::warn!(
                    "component '{}' received an open event but is not switchable",
                    event.component_id
                );
                false
            }
        },
        EventOperation::Close => match component.as_switchable_mut() {
            Some(switchable) => switchable.close(),
            None => {
                log::warn!(
                    "component '{}' received a close event but is not switchable",
                    event.component_id
                );
                false
            }
        },
        EventOperation::SetParameter { name, value } => {
            match component.attributes().get(name) {
                Some(attr) => {
                    attr.set(*value);
                }
                None => log::warn!(
                    "component '{}' has no attribute '{name}' to set",
                    event.component_id
                ),
            }
            false
        }
    };

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmna_components::Switch;
    use gridmna_core::{Domain, PhaseType, SystemTopologyBuilder};

    #[test]
    fn out_of_order_events_are_applied_in_ascending_time() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("n1").unwrap();
        builder
            .add_component(
                Box::new(Switch::<f64>::new("sw1", Domain::Sp, false)),
                vec!["n1".to_string(), "GND".to_string()],
            )
            .unwrap();
        let mut topo = builder.build().unwrap();

        let mut schedule = EventSchedule::new(vec![
            ScheduledEvent {
                time: 0.2,
                component_id: "sw1".to_string(),
                operation: EventOperation::Open,
            },
            ScheduledEvent {
                time: 0.1,
                component_id: "sw1".to_string(),
                operation: EventOperation::Close,
            },
        ]);

        assert!(schedule.apply_due(&mut topo, 0.1));
        assert!(schedule.apply_due(&mut topo, 0.2));
        assert!(!schedule.apply_due(&mut topo, 0.3));
    }

    #[test]
    fn event_targeting_unknown_component_is_skipped_not_fatal() {
        let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-3, PhaseType::Single);
        builder.add_node("n1").unwrap();
        let mut topo = builder.build().unwrap();
        let mut schedule = EventSchedule::new(vec![ScheduledEvent {
            time: 0.0,
            component_id: "ghost".to_string(),
            operation: EventOperation::Open,
        }]);
        assert!(!schedule.apply_due(&mut topo, 1.0));
    }
}
