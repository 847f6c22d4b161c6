//! Pin-drag-to-place
//!
//! When a connection dragged from a pin is dropped on empty canvas, a new
//! node or placeholder layer is created and wired to the dragged pin. The
//! match is a single greedy pass over the new entity's pins in declared
//! order; the first compatible pin wins and no pin at all is not an error.

use std::collections::HashMap;

use crate::commands::ConnectPins;
use crate::error::Result;
use crate::pin::{is_compatible, Pin, PinType};
use crate::types::{new_id, Coordinates, Layer, Node};

/// The pin a connection was dragged from, with its owning node or layer
#[derive(Debug, Clone, PartialEq)]
pub struct DraggedPin {
    pub owner_id: String,
    pub pin: Pin,
}

impl DraggedPin {
    pub fn new(owner_id: impl Into<String>, pin: Pin) -> Self {
        Self {
            owner_id: owner_id.into(),
            pin,
        }
    }

    /// Connect command between the dragged pin and a pin on `owner_id`,
    /// oriented output to input
    pub fn connect_to(&self, owner_id: &str, pin: &Pin) -> Result<ConnectPins> {
        match self.pin.pin_type {
            PinType::Output => ConnectPins::new(&self.owner_id, &self.pin.id, owner_id, &pin.id),
            PinType::Input => ConnectPins::new(owner_id, &pin.id, &self.owner_id, &self.pin.id),
        }
    }
}

/// First candidate compatible with the dragged pin
pub fn find_matching_pin<'a>(
    dragged: &Pin,
    candidates: impl IntoIterator<Item = &'a Pin>,
    refs: &HashMap<String, String>,
) -> Option<&'a Pin> {
    candidates
        .into_iter()
        .find(|candidate| is_compatible(dragged, candidate, refs))
}

/// First pin of a freshly placed node that accepts the dragged pin
pub fn matching_node_pin<'a>(
    dragged: &Pin,
    node: &'a Node,
    refs: &HashMap<String, String>,
) -> Option<&'a Pin> {
    find_matching_pin(dragged, node.ordered_pins(), refs)
}

/// First boundary pin of a placeholder layer that accepts the dragged pin
///
/// Boundary pins pointing the same way as the dragged pin are never
/// candidates.
pub fn matching_layer_pin<'a>(
    dragged: &Pin,
    layer: &'a Layer,
    refs: &HashMap<String, String>,
) -> Option<&'a Pin> {
    let candidates = layer
        .ordered_pins()
        .into_iter()
        .filter(|pin| pin.pin_type != dragged.pin_type);
    find_matching_pin(dragged, candidates, refs)
}

/// A new empty layer exposing one boundary pin that mirrors the dragged pin
///
/// The boundary pin has the opposite direction and the same data type,
/// container shape and schema, so it always matches the dragged pin.
pub fn placeholder_layer(dragged: &Pin, position: Coordinates) -> Layer {
    let mut layer = Layer::new(new_id(), "New Layer");
    layer.coordinates = position;

    let mut pin = Pin::new(
        new_id(),
        dragged.name.clone(),
        dragged.pin_type.opposite(),
        dragged.data_type,
    );
    pin.friendly_name = dragged.friendly_name.clone();
    pin.value_type = dragged.value_type;
    pin.schema = dragged.schema.clone();
    pin.options = dragged.options.clone();
    layer.pins.insert(pin.id.clone(), pin);
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{NodeBuilder, PinBuilder};
    use crate::pin::{DataType, ValueType};

    fn control_branch() -> Node {
        NodeBuilder::new("branch", "control_branch")
            .output("true", DataType::Boolean)
            .output("false", DataType::Boolean)
            .input("exec_in", DataType::Execution)
            .build()
    }

    fn no_refs() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_execution_output_picks_execution_input() {
        let dragged = Pin::new("src/exec_out", "exec_out", PinType::Output, DataType::Execution);
        let node = control_branch();
        let matched = matching_node_pin(&dragged, &node, &no_refs()).unwrap();
        assert_eq!(matched.name, "exec_in");
    }

    #[test]
    fn test_first_match_in_declared_order() {
        let node = NodeBuilder::new("n", "sum")
            .input("b", DataType::Integer)
            .input("a", DataType::Integer)
            .build();
        let dragged = Pin::new("x", "x", PinType::Output, DataType::Integer);
        assert_eq!(matching_node_pin(&dragged, &node, &no_refs()).unwrap().name, "b");
    }

    #[test]
    fn test_no_match_yields_none() {
        let dragged = Pin::new("x", "x", PinType::Output, DataType::String);
        assert!(matching_node_pin(&dragged, &control_branch(), &no_refs()).is_none());
    }

    #[test]
    fn test_connect_is_oriented_output_to_input() {
        let node = control_branch();
        let exec_in = node.pin_by_name("exec_in").unwrap();
        let dragged = DraggedPin::new(
            "src",
            Pin::new("src/exec_out", "exec_out", PinType::Output, DataType::Execution),
        );
        let command = dragged.connect_to(&node.id, exec_in).unwrap();
        assert_eq!(command.from_pin, "src/exec_out");
        assert_eq!(command.to_pin, exec_in.id);

        let upstream = DraggedPin::new(
            "sink",
            Pin::new("sink/flag", "flag", PinType::Input, DataType::Boolean),
        );
        let out = node.pin_by_name("true").unwrap();
        let command = upstream.connect_to(&node.id, out).unwrap();
        assert_eq!(command.from_node, "branch");
        assert_eq!(command.to_pin, "sink/flag");
    }

    #[test]
    fn test_placeholder_layer_mirrors_dragged_pin() {
        let mut dragged = PinBuilder::new("items", PinType::Output, DataType::String)
            .value_type(ValueType::Array)
            .build("src/items");
        dragged.schema = Some("schema".into());

        let layer = placeholder_layer(&dragged, (10.0, 20.0, 0.0));
        assert_eq!(layer.coordinates, (10.0, 20.0, 0.0));
        assert_eq!(layer.pins.len(), 1);

        let matched = matching_layer_pin(&dragged, &layer, &no_refs()).unwrap();
        assert_eq!(matched.pin_type, PinType::Input);
        assert_eq!(matched.value_type, ValueType::Array);
        assert_eq!(matched.schema.as_deref(), Some("schema"));
    }

    #[test]
    fn test_layer_matching_skips_same_direction() {
        let dragged = Pin::new("x", "x", PinType::Output, DataType::Generic);
        let mut layer = Layer::new("l", "Layer");
        let mut same = Pin::new("same", "same", PinType::Output, DataType::Generic);
        same.index = 0;
        let mut opposite = Pin::new("opposite", "opposite", PinType::Input, DataType::String);
        opposite.index = 1;
        layer.pins.insert(same.id.clone(), same);
        layer.pins.insert(opposite.id.clone(), opposite);

        assert_eq!(
            matching_layer_pin(&dragged, &layer, &no_refs()).unwrap().id,
            "opposite"
        );
    }
}
