//! Event sink
//!
//! Events are composite values appended to a host-supplied sink in
//! exactly the order the evaluator emits them. For a single resource
//! destruction that order is: interface `ResourceDestroyed` events in
//! conformance pre-order, then the concrete type's own event last.

use crate::value::{CompositeData, Value};
use tally_core::location::Location;
use tally_core::types::{CompositeKind, CompositeType};

pub trait EventSink {
    fn emit(&mut self, event: Value);
}

/// Sink that records every event in order; the default for tests and
/// embedders that drain events after a run
#[derive(Default)]
pub struct CollectingEventSink {
    pub events: Vec<Value>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        CollectingEventSink::default()
    }

    /// Type identifiers of the collected events, in emission order
    pub fn type_ids(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Value::Composite(data) => Some(data.borrow().type_.type_id()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&mut self, event: Value) {
        self.events.push(event);
    }
}

/// Build an event composite from ordered fields
pub fn make_event(
    location: Location,
    qualified_name: impl Into<String>,
    fields: Vec<(String, Value)>,
) -> Value {
    let mut data = CompositeData::new(CompositeType::new(
        location,
        qualified_name,
        CompositeKind::Event,
    ));
    for (name, value) in fields {
        data.fields.insert(name, value);
    }
    Value::new_composite(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::IntegerValue;

    #[test]
    fn test_sink_preserves_emission_order() {
        let mut sink = CollectingEventSink::new();
        let location = Location::Script("test".to_string());
        sink.emit(make_event(location.clone(), "I.ResourceDestroyed", vec![]));
        sink.emit(make_event(
            location.clone(),
            "A.ResourceDestroyed",
            vec![(
                "id".to_string(),
                Value::Integer(IntegerValue::Int(1.into())),
            )],
        ));
        assert_eq!(
            sink.type_ids(),
            vec!["S.test.I.ResourceDestroyed", "S.test.A.ResourceDestroyed"]
        );
    }
}
