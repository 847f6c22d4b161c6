//! Fluent builders for boards and node templates
//!
//! Provides a fluent API for constructing boards programmatically, mostly
//! for hosts that seed a catalog and for tests.

use crate::pin::{DataType, Pin, PinOptions, PinType, ValueType};
use crate::types::{Board, Comment, Layer, Node, Variable, Version};

/// Fluent builder for a single pin
///
/// The pin id and declared index are assigned by [`NodeBuilder::pin`].
pub struct PinBuilder {
    pin: Pin,
}

impl PinBuilder {
    pub fn new(name: impl Into<String>, pin_type: PinType, data_type: DataType) -> Self {
        Self {
            pin: Pin::new(String::new(), name, pin_type, data_type),
        }
    }

    pub fn input(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, PinType::Input, data_type)
    }

    pub fn output(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, PinType::Output, data_type)
    }

    pub fn friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.pin.friendly_name = friendly_name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.pin.description = description.into();
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.pin.value_type = value_type;
        self
    }

    /// Inline schema or a key into the board's `refs`
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.pin.schema = Some(schema.into());
        self
    }

    pub fn default_value(mut self, value: Vec<u8>) -> Self {
        self.pin.default_value = Some(value);
        self
    }

    pub fn options(mut self, options: PinOptions) -> Self {
        self.pin.options = Some(options);
        self
    }

    /// Build a free-standing pin, e.g. a layer boundary pin
    pub fn build(self, id: impl Into<String>) -> Pin {
        let mut pin = self.pin;
        pin.id = id.into();
        pin
    }
}

/// Fluent builder for nodes and node templates
///
/// Pin ids are `"{node_id}/{pin_name}"` and pins are indexed in the order
/// they are added.
///
/// # Example
///
/// ```ignore
/// let branch = NodeBuilder::new("branch", "control_branch")
///     .input("exec", DataType::Execution)
///     .input("condition", DataType::Boolean)
///     .output("true", DataType::Execution)
///     .output("false", DataType::Execution)
///     .build();
/// ```
pub struct NodeBuilder {
    node: Node,
    next_index: u16,
}

impl NodeBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: Node::new(id, name),
            next_index: 0,
        }
    }

    pub fn friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.node.friendly_name = friendly_name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.node.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.node.category = category.into();
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.node.coordinates = (x, y, 0.0);
        self
    }

    /// Mark the node as an entry point
    pub fn start(mut self) -> Self {
        self.node.start = true;
        self
    }

    pub fn event_callback(mut self) -> Self {
        self.node.event_callback = true;
        self
    }

    /// Add a fully configured pin
    pub fn pin(mut self, pin: PinBuilder) -> Self {
        let id = format!("{}/{}", self.node.id, pin.pin.name);
        let mut pin = pin.build(id);
        pin.index = self.next_index;
        self.next_index += 1;
        self.node.pins.insert(pin.id.clone(), pin);
        self
    }

    pub fn input(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.pin(PinBuilder::input(name, data_type))
    }

    pub fn output(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.pin(PinBuilder::output(name, data_type))
    }

    pub fn build(self) -> Node {
        self.node
    }
}

/// Fluent builder for boards
///
/// # Example
///
/// ```ignore
/// let board = BoardBuilder::new("board-1", "My Board")
///     .add_node(NodeBuilder::new("start", "events_simple").start().output("exec", DataType::Execution).build())
///     .add_node(NodeBuilder::new("log", "log_info").input("exec", DataType::Execution).build())
///     .connect("start/exec", "log/exec")
///     .build();
/// ```
pub struct BoardBuilder {
    board: Board,
    connections: Vec<(String, String)>,
}

impl BoardBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            board: Board::new(id, name),
            connections: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.board.description = description.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.board.version = version;
        self
    }

    /// Add a node to the root scope
    pub fn add_node(mut self, node: Node) -> Self {
        self.board.nodes.insert(node.id.clone(), node);
        self
    }

    /// Add a layer; nesting follows its `parent_id`
    pub fn add_layer(mut self, layer: Layer) -> Self {
        self.board.layers.insert(layer.id.clone(), layer);
        self
    }

    pub fn add_comment(mut self, comment: Comment) -> Self {
        self.board.comments.insert(comment.id.clone(), comment);
        self
    }

    pub fn add_variable(mut self, variable: Variable) -> Self {
        self.board.variables.insert(variable.id.clone(), variable);
        self
    }

    /// Register a named schema
    pub fn with_ref(mut self, key: impl Into<String>, schema: impl Into<String>) -> Self {
        self.board.refs.insert(key.into(), schema.into());
        self
    }

    /// Connect two pins by id once the board is built
    ///
    /// Unknown pins are skipped.
    pub fn connect(mut self, from_pin: impl Into<String>, to_pin: impl Into<String>) -> Self {
        self.connections.push((from_pin.into(), to_pin.into()));
        self
    }

    pub fn build(self) -> Board {
        let mut board = self.board;
        for (from, to) in &self.connections {
            if board.find_pin(from).is_some() && board.find_pin(to).is_some() {
                board.link(from, to);
            } else {
                log::warn!("Skipping connection {} -> {}: unknown pin", from, to);
            }
        }
        board
    }
}
