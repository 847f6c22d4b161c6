//! Core types for boards
//!
//! A board is the aggregate root of a workflow: nodes, comments, layers
//! (nested sub-graphs) and variables, plus the schema reference table and
//! the version it was loaded at. Edges are not stored; they are derived from
//! the `connected_to`/`depends_on` sets of the pins.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pin::{DataType, Pin, PinId, ValueType};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a layer
pub type LayerId = String;

/// Canvas coordinates (x, y, z)
pub type Coordinates = (f32, f32, f32);

/// Board version triple (major, minor, patch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version(pub u32, pub u32, pub u32);

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self(major, minor, patch)
    }

    /// Increment one component, resetting the lower ones
    pub fn bump(&self, bump: VersionBump) -> Self {
        match bump {
            VersionBump::Major => Self(self.0 + 1, 0, 0),
            VersionBump::Minor => Self(self.0, self.1 + 1, 0),
            VersionBump::Patch => Self(self.0, self.1, self.2 + 1),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// Which component of a version to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

/// A node instance on a board, or a node template in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Catalog name of the node kind (e.g. "control_branch")
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub pins: HashMap<PinId, Pin>,
    /// Entry point that can start a run
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub event_callback: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            friendly_name: name.clone(),
            name,
            description: String::new(),
            category: String::new(),
            coordinates: (0.0, 0.0, 0.0),
            pins: HashMap::new(),
            start: false,
            event_callback: false,
        }
    }

    /// Pins in declared order
    pub fn ordered_pins(&self) -> Vec<&Pin> {
        ordered_pins(&self.pins)
    }

    /// Find a pin by its name
    pub fn pin_by_name(&self, name: &str) -> Option<&Pin> {
        self.pins.values().find(|p| p.name == name)
    }

    /// Give the node and all its pins fresh ids and drop any connections
    ///
    /// Turns a catalog template into a concrete instance.
    pub fn instantiate(&mut self) {
        self.id = new_id();
        self.pins = std::mem::take(&mut self.pins)
            .into_values()
            .map(|mut pin| {
                pin.id = new_id();
                pin.connected_to.clear();
                pin.depends_on.clear();
                (pin.id.clone(), pin)
            })
            .collect();
    }
}

/// A freeform note on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub z_index: Option<i32>,
}

impl Comment {
    pub fn new(id: impl Into<String>, content: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            coordinates,
            width: None,
            height: None,
            color: None,
            z_index: None,
        }
    }
}

/// A board or layer scoped variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub default_value: Option<Vec<u8>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub exposed: bool,
    #[serde(default)]
    pub secret: bool,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type,
            value_type: ValueType::Normal,
            default_value: None,
            description: String::new(),
            editable: true,
            exposed: false,
            secret: false,
        }
    }
}

/// A nested, collapsible sub-graph
///
/// The layer's own `pins` are its boundary: they are what the parent scope
/// sees and wires to, like the pins of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    /// Enclosing layer, `None` for layers placed on the root
    #[serde(default)]
    pub parent_id: Option<LayerId>,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub pins: HashMap<PinId, Pin>,
    #[serde(default)]
    pub nodes: HashMap<NodeId, Node>,
    #[serde(default)]
    pub comments: HashMap<String, Comment>,
    #[serde(default)]
    pub variables: HashMap<String, Variable>,
}

impl Layer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            coordinates: (0.0, 0.0, 0.0),
            color: None,
            pins: HashMap::new(),
            nodes: HashMap::new(),
            comments: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    /// Boundary pins in declared order
    pub fn ordered_pins(&self) -> Vec<&Pin> {
        ordered_pins(&self.pins)
    }
}

/// Mutable view of the entity maps of one scope (the root or a layer)
pub struct ScopeMut<'a> {
    pub nodes: &'a mut HashMap<NodeId, Node>,
    pub comments: &'a mut HashMap<String, Comment>,
    pub variables: &'a mut HashMap<String, Variable>,
}

/// A stored workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: HashMap<NodeId, Node>,
    #[serde(default)]
    pub comments: HashMap<String, Comment>,
    /// All layers of the board, nested through `parent_id`
    #[serde(default)]
    pub layers: HashMap<LayerId, Layer>,
    #[serde(default)]
    pub variables: HashMap<String, Variable>,
    /// Named schemas referenced by pins
    #[serde(default)]
    pub refs: HashMap<String, String>,
    #[serde(default)]
    pub version: Version,
}

impl Board {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Entity maps of the root (`None`) or of a layer
    pub fn scope_mut(&mut self, layer: Option<&str>) -> Option<ScopeMut<'_>> {
        match layer {
            None => Some(ScopeMut {
                nodes: &mut self.nodes,
                comments: &mut self.comments,
                variables: &mut self.variables,
            }),
            Some(id) => self.layers.get_mut(id).map(|layer| ScopeMut {
                nodes: &mut layer.nodes,
                comments: &mut layer.comments,
                variables: &mut layer.variables,
            }),
        }
    }

    /// Whether a scope exists
    pub fn has_scope(&self, layer: Option<&str>) -> bool {
        layer.map_or(true, |id| self.layers.contains_key(id))
    }

    /// Nodes of the root (`None`) or of a layer
    pub fn nodes_in(&self, layer: Option<&str>) -> Option<&HashMap<NodeId, Node>> {
        match layer {
            None => Some(&self.nodes),
            Some(id) => self.layers.get(id).map(|l| &l.nodes),
        }
    }

    /// Comments of the root (`None`) or of a layer
    pub fn comments_in(&self, layer: Option<&str>) -> Option<&HashMap<String, Comment>> {
        match layer {
            None => Some(&self.comments),
            Some(id) => self.layers.get(id).map(|l| &l.comments),
        }
    }

    /// Layers whose parent is the given scope
    pub fn child_layers<'a>(&'a self, parent: Option<&'a str>) -> impl Iterator<Item = &'a Layer> + 'a {
        self.layers
            .values()
            .filter(move |l| l.parent_id.as_deref() == parent)
    }

    /// A layer and every layer nested inside it, parents first
    pub fn layer_subtree(&self, layer_id: &str) -> Vec<LayerId> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([layer_id.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !self.layers.contains_key(&id) || result.contains(&id) {
                continue;
            }
            queue.extend(self.child_layers(Some(&id)).map(|l| l.id.clone()));
            result.push(id);
        }
        result
    }

    /// The scope that contains a node: `Some(None)` for the root
    pub fn locate_node(&self, node_id: &str) -> Option<Option<LayerId>> {
        if self.nodes.contains_key(node_id) {
            return Some(None);
        }
        self.layers
            .values()
            .find(|l| l.nodes.contains_key(node_id))
            .map(|l| Some(l.id.clone()))
    }

    /// The scope that contains a comment: `Some(None)` for the root
    pub fn locate_comment(&self, comment_id: &str) -> Option<Option<LayerId>> {
        if self.comments.contains_key(comment_id) {
            return Some(None);
        }
        self.layers
            .values()
            .find(|l| l.comments.contains_key(comment_id))
            .map(|l| Some(l.id.clone()))
    }

    /// The scope that contains a variable: `Some(None)` for the root
    pub fn locate_variable(&self, variable_id: &str) -> Option<Option<LayerId>> {
        if self.variables.contains_key(variable_id) {
            return Some(None);
        }
        self.layers
            .values()
            .find(|l| l.variables.contains_key(variable_id))
            .map(|l| Some(l.id.clone()))
    }

    /// Find a node in any scope
    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes
            .get(node_id)
            .or_else(|| self.layers.values().find_map(|l| l.nodes.get(node_id)))
    }

    /// Find a node in any scope (mutable)
    pub fn find_node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        let Board { nodes, layers, .. } = self;
        nodes
            .values_mut()
            .chain(layers.values_mut().flat_map(|l| l.nodes.values_mut()))
            .find(|n| n.id == node_id)
    }

    /// Whether any node, comment, layer or variable already uses the id
    pub fn contains_id(&self, id: &str) -> bool {
        self.layers.contains_key(id)
            || self.locate_node(id).is_some()
            || self.locate_comment(id).is_some()
            || self.locate_variable(id).is_some()
    }

    /// Find a pin on any node or layer boundary
    pub fn find_pin(&self, pin_id: &str) -> Option<&Pin> {
        self.nodes
            .values()
            .find_map(|n| n.pins.get(pin_id))
            .or_else(|| {
                self.layers.values().find_map(|l| {
                    l.pins
                        .get(pin_id)
                        .or_else(|| l.nodes.values().find_map(|n| n.pins.get(pin_id)))
                })
            })
    }

    /// Find a pin on any node or layer boundary (mutable)
    pub fn find_pin_mut(&mut self, pin_id: &str) -> Option<&mut Pin> {
        let Board { nodes, layers, .. } = self;
        let root = nodes.values_mut().flat_map(|n| n.pins.values_mut());
        let nested = layers.values_mut().flat_map(|layer| {
            let Layer { nodes, pins, .. } = layer;
            nodes
                .values_mut()
                .flat_map(|n| n.pins.values_mut())
                .chain(pins.values_mut())
        });
        root.chain(nested).find(|p| p.id == pin_id)
    }

    /// Record `from -> to` on both pins
    ///
    /// Returns whether either side changed. Missing pins are skipped.
    pub(crate) fn link(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        if let Some(pin) = self.find_pin_mut(from) {
            changed |= pin.connected_to.insert(to.to_string());
        }
        if let Some(pin) = self.find_pin_mut(to) {
            changed |= pin.depends_on.insert(from.to_string());
        }
        changed
    }

    /// Remove `from -> to` from both pins
    pub(crate) fn unlink(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        if let Some(pin) = self.find_pin_mut(from) {
            changed |= pin.connected_to.remove(to);
        }
        if let Some(pin) = self.find_pin_mut(to) {
            changed |= pin.depends_on.remove(from);
        }
        changed
    }

    /// Remove detached pins from the connection sets of their surviving peers
    ///
    /// The detached pins keep their own sets so that `reattach_pins` can
    /// restore both sides later.
    pub(crate) fn detach_pins<'a>(&mut self, pins: impl IntoIterator<Item = &'a Pin>) {
        for pin in pins {
            for peer in &pin.connected_to {
                if let Some(peer) = self.find_pin_mut(peer) {
                    peer.depends_on.remove(&pin.id);
                }
            }
            for peer in &pin.depends_on {
                if let Some(peer) = self.find_pin_mut(peer) {
                    peer.connected_to.remove(&pin.id);
                }
            }
        }
    }

    /// Restore the peer side of connections recorded on re-inserted pins
    pub(crate) fn reattach_pins<'a>(&mut self, pins: impl IntoIterator<Item = &'a Pin>) {
        for pin in pins {
            for peer in &pin.connected_to {
                if let Some(peer) = self.find_pin_mut(peer) {
                    peer.depends_on.insert(pin.id.clone());
                }
            }
            for peer in &pin.depends_on {
                if let Some(peer) = self.find_pin_mut(peer) {
                    peer.connected_to.insert(pin.id.clone());
                }
            }
        }
    }
}

/// Generate a fresh entity id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn ordered_pins(pins: &HashMap<PinId, Pin>) -> Vec<&Pin> {
    let mut ordered: Vec<&Pin> = pins.values().collect();
    ordered.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));
    ordered
}
