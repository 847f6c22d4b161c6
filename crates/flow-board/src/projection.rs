//! Render-ready projection of a board
//!
//! A projection is what a canvas draws for one scope: the nodes, layers and
//! comments of the open layer (or the root), the edges between their pins,
//! and a pin cache that maps every visible handle back to its pin and
//! owning entity. It is rebuilt wholesale from each board snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::pin::{DataType, Pin, PinId, PinType};
use crate::types::{Board, Coordinates, Layer};

/// Kind of entity owning a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OwnerKind {
    Node,
    Layer,
}

/// A pin registered in the cache together with its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPin {
    pub pin: Pin,
    pub owner_id: String,
    pub owner_kind: OwnerKind,
    /// The pin is exposed on a collapsed layer rather than a node
    pub is_layer_boundary: bool,
}

impl CachedPin {
    /// Direction of the pin as seen from the projected scope
    pub fn pin_type(&self) -> PinType {
        self.pin.pin_type
    }
}

/// Lookup from handle id to pin and owner for the visible scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinCache {
    entries: HashMap<PinId, CachedPin>,
    refs: HashMap<String, String>,
}

impl PinCache {
    pub fn get(&self, pin_id: &str) -> Option<&CachedPin> {
        self.entries.get(pin_id)
    }

    pub fn contains(&self, pin_id: &str) -> bool {
        self.entries.contains_key(pin_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedPin> {
        self.entries.values()
    }

    /// Schema references of the board the cache was built from
    pub fn refs(&self) -> &HashMap<String, String> {
        &self.refs
    }

    fn register(&mut self, pin: &Pin, owner_id: &str, owner_kind: OwnerKind, is_layer_boundary: bool) {
        self.entries.insert(
            pin.id.clone(),
            CachedPin {
                pin: pin.clone(),
                owner_id: owner_id.to_string(),
                owner_kind,
                is_layer_boundary,
            },
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualNodeKind {
    Node,
    Layer,
    Comment,
    /// Interface of the open layer, seen from inside
    Interface,
}

/// A top-level entity drawn on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualNode {
    pub id: String,
    pub kind: VisualNodeKind,
    pub position: Coordinates,
    pub label: String,
    /// Handles in declared order; empty for comments
    pub pins: Vec<PinId>,
    pub selected: bool,
    pub start: bool,
    pub event_callback: bool,
}

/// An edge derived from one connected pin pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEdge {
    /// `"{from_pin}-{to_pin}"`
    pub id: String,
    pub source: String,
    pub source_handle: PinId,
    pub target: String,
    pub target_handle: PinId,
    pub data_type: DataType,
    /// Execution edges animate while not selected
    pub animated: bool,
    pub selected: bool,
}

impl VisualEdge {
    pub fn is_execution(&self) -> bool {
        self.data_type == DataType::Execution
    }
}

/// Everything a canvas needs to draw one scope of a board
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
    pub pin_cache: PinCache,
}

impl Projection {
    pub fn node(&self, id: &str) -> Option<&VisualNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&VisualEdge> {
        self.edges.iter().find(|e| e.id == id)
    }
}

/// Identity of the edge between two pins
pub fn edge_id(from_pin: &str, to_pin: &str) -> String {
    format!("{}-{}", from_pin, to_pin)
}

/// Inner pins of a collapsed layer that are wired to something outside it
///
/// These are drawn on the layer so that connections crossing its boundary
/// stay visible from the enclosing scope.
fn crossing_pins<'a>(board: &'a Board, layer: &Layer) -> Vec<&'a Pin> {
    let subtree = board.layer_subtree(&layer.id);
    let inside: HashSet<&str> = subtree
        .iter()
        .filter_map(|id| board.layers.get(id))
        .flat_map(|l| l.nodes.values().flat_map(|n| n.pins.keys()).chain(l.pins.keys()))
        .map(String::as_str)
        .collect();

    let mut pins: Vec<&Pin> = subtree
        .iter()
        .filter_map(|id| board.layers.get(id))
        .flat_map(|l| l.nodes.values().flat_map(|n| n.pins.values()))
        .filter(|pin| pin.peers().any(|peer| !inside.contains(peer.as_str())))
        .collect();
    // Inputs first, then outputs
    pins.sort_by(|a, b| {
        let a_out = a.pin_type == PinType::Output;
        let b_out = b.pin_type == PinType::Output;
        a_out.cmp(&b_out).then_with(|| a.id.cmp(&b.id))
    });
    pins
}

/// The open layer's boundary pins as seen from inside the layer
///
/// An input of the layer feeds the nodes within it and an output collects
/// from them, so each pin is cached with its direction flipped. Connection
/// lists are kept as stored; edges only use the side matching the flipped
/// direction, which is the interior one.
fn interior_pins(layer: &Layer) -> Vec<Pin> {
    layer
        .ordered_pins()
        .into_iter()
        .map(|pin| {
            let mut interior = pin.clone();
            interior.pin_type = pin.pin_type.opposite();
            interior
        })
        .collect()
}

/// Project one scope of a board for rendering
///
/// Only the nodes, layers and comments whose scope is `current_layer` (the
/// root when `None`) become visual nodes. Every pin of a visible node or
/// layer is registered in the pin cache, and one edge is emitted per
/// distinct connected pair whose ends are both visible. The boundary pins
/// of the open layer itself are cached from the inside and drawn on an
/// interface node.
pub fn project(board: &Board, current_layer: Option<&str>, selection: &HashSet<String>) -> Projection {
    let mut cache = PinCache {
        entries: HashMap::new(),
        refs: board.refs.clone(),
    };
    let mut visual_nodes = Vec::new();

    let mut layers: Vec<&Layer> = board.child_layers(current_layer).collect();
    layers.sort_by(|a, b| a.id.cmp(&b.id));
    for layer in layers {
        let mut handles = Vec::new();
        for pin in layer.ordered_pins() {
            cache.register(pin, &layer.id, OwnerKind::Layer, true);
            handles.push(pin.id.clone());
        }
        for pin in crossing_pins(board, layer) {
            cache.register(pin, &layer.id, OwnerKind::Layer, true);
            handles.push(pin.id.clone());
        }
        visual_nodes.push(VisualNode {
            id: layer.id.clone(),
            kind: VisualNodeKind::Layer,
            position: layer.coordinates,
            label: layer.name.clone(),
            pins: handles,
            selected: selection.contains(&layer.id),
            start: false,
            event_callback: false,
        });
    }

    if let Some(open) = current_layer.and_then(|id| board.layers.get(id)) {
        let pins = interior_pins(open);
        if !pins.is_empty() {
            let handles = pins
                .iter()
                .map(|pin| {
                    cache.register(pin, &open.id, OwnerKind::Layer, true);
                    pin.id.clone()
                })
                .collect();
            visual_nodes.push(VisualNode {
                id: open.id.clone(),
                kind: VisualNodeKind::Interface,
                position: open.coordinates,
                label: open.name.clone(),
                pins: handles,
                selected: false,
                start: false,
                event_callback: false,
            });
        }
    }

    if let Some(nodes) = board.nodes_in(current_layer) {
        let sorted: BTreeMap<_, _> = nodes.iter().collect();
        for node in sorted.into_values() {
            let handles = node
                .ordered_pins()
                .into_iter()
                .map(|pin| {
                    cache.register(pin, &node.id, OwnerKind::Node, false);
                    pin.id.clone()
                })
                .collect();
            visual_nodes.push(VisualNode {
                id: node.id.clone(),
                kind: VisualNodeKind::Node,
                position: node.coordinates,
                label: node.friendly_name.clone(),
                pins: handles,
                selected: selection.contains(&node.id),
                start: node.start,
                event_callback: node.event_callback,
            });
        }
    }

    if let Some(comments) = board.comments_in(current_layer) {
        let sorted: BTreeMap<_, _> = comments.iter().collect();
        for comment in sorted.into_values() {
            visual_nodes.push(VisualNode {
                id: comment.id.clone(),
                kind: VisualNodeKind::Comment,
                position: comment.coordinates,
                label: comment.content.clone(),
                pins: Vec::new(),
                selected: selection.contains(&comment.id),
                start: false,
                event_callback: false,
            });
        }
    }

    let edges = derive_edges(&cache, selection);
    log::debug!(
        "Projected board '{}' at {}: {} node(s), {} edge(s), {} pin(s)",
        board.id,
        current_layer.unwrap_or("root"),
        visual_nodes.len(),
        edges.len(),
        cache.len()
    );

    Projection {
        nodes: visual_nodes,
        edges,
        pin_cache: cache,
    }
}

fn derive_edges(cache: &PinCache, selection: &HashSet<String>) -> Vec<VisualEdge> {
    let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
    for entry in cache.iter() {
        let pin = &entry.pin;
        match pin.pin_type {
            PinType::Output => {
                for to in &pin.connected_to {
                    pairs.insert((pin.id.as_str(), to.as_str()));
                }
            }
            PinType::Input => {
                for from in &pin.depends_on {
                    pairs.insert((from.as_str(), pin.id.as_str()));
                }
            }
        }
    }

    pairs
        .into_iter()
        .filter_map(|(from, to)| {
            let source = cache.get(from)?;
            let target = cache.get(to)?;
            // Both ends collapsed into the same layer
            if source.owner_id == target.owner_id && source.is_layer_boundary {
                return None;
            }
            let id = edge_id(from, to);
            let selected = selection.contains(&id);
            let data_type = source.pin.data_type;
            Some(VisualEdge {
                source: source.owner_id.clone(),
                source_handle: from.to_string(),
                target: target.owner_id.clone(),
                target_handle: to.to_string(),
                data_type,
                animated: data_type == DataType::Execution && !selected,
                selected,
                id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BoardBuilder, NodeBuilder};
    use crate::types::Comment;

    fn board() -> Board {
        let mut layer = Layer::new("l1", "Inner");
        layer.nodes.insert(
            "n2".into(),
            NodeBuilder::new("n2", "log")
                .input("exec", DataType::Execution)
                .input("text", DataType::String)
                .build(),
        );
        BoardBuilder::new("b", "Board")
            .add_node(
                NodeBuilder::new("n1", "start")
                    .start()
                    .output("exec", DataType::Execution)
                    .output("text", DataType::String)
                    .build(),
            )
            .add_node(NodeBuilder::new("n3", "sink").input("exec", DataType::Execution).build())
            .add_layer(layer)
            .add_comment(Comment::new("c1", "hello", (0.0, 0.0, 0.0)))
            .connect("n1/exec", "n3/exec")
            .connect("n1/text", "n2/text")
            .build()
    }

    #[test]
    fn test_root_projection() {
        let projection = project(&board(), None, &HashSet::new());

        let ids: Vec<_> = projection.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "n1", "n3", "c1"]);
        assert!(!projection.pin_cache.contains("n2/exec"));
        assert!(projection.node("n1").unwrap().start);

        let exec = projection.edge("n1/exec-n3/exec").unwrap();
        assert!(exec.is_execution());
        assert!(exec.animated);
        assert_eq!(exec.source, "n1");
        assert_eq!(exec.target, "n3");
    }

    #[test]
    fn test_crossing_connections_surface_on_the_layer() {
        let projection = project(&board(), None, &HashSet::new());

        let cached = projection.pin_cache.get("n2/text").unwrap();
        assert_eq!(cached.owner_id, "l1");
        assert!(cached.is_layer_boundary);

        let edge = projection.edge("n1/text-n2/text").unwrap();
        assert_eq!(edge.target, "l1");
        assert!(!edge.animated);
        assert_eq!(projection.edges.len(), 2);
    }

    #[test]
    fn test_layer_projection_is_scoped() {
        let projection = project(&board(), Some("l1"), &HashSet::new());

        let ids: Vec<_> = projection.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2"]);
        let cached = projection.pin_cache.get("n2/exec").unwrap();
        assert_eq!(cached.owner_kind, OwnerKind::Node);
        assert!(!cached.is_layer_boundary);
        // The peer lives outside the open layer
        assert!(projection.edges.is_empty());
    }

    #[test]
    fn test_open_layer_boundary_is_reachable_from_inside() {
        let mut board = board();
        let mut input = Pin::new("l1/in", "in", PinType::Input, DataType::String);
        input.index = 0;
        let mut output = Pin::new("l1/out", "out", PinType::Output, DataType::Execution);
        output.index = 1;
        let layer = board.layers.get_mut("l1").unwrap();
        layer.pins.insert(input.id.clone(), input);
        layer.pins.insert(output.id.clone(), output);
        board.link("n1/text", "l1/in");
        board.link("l1/in", "n2/text");

        let projection = project(&board, Some("l1"), &HashSet::new());

        let interface = projection.node("l1").unwrap();
        assert_eq!(interface.kind, VisualNodeKind::Interface);
        assert_eq!(interface.pins, vec!["l1/in", "l1/out"]);

        let cached = projection.pin_cache.get("l1/in").unwrap();
        assert_eq!(cached.owner_id, "l1");
        assert!(cached.is_layer_boundary);
        assert_eq!(cached.pin_type(), PinType::Output);
        assert_eq!(projection.pin_cache.get("l1/out").unwrap().pin_type(), PinType::Input);

        // Only the interior side of the interface is drawn
        let ids: Vec<_> = projection.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["l1/in-n2/text"]);
        assert_eq!(projection.edges[0].source, "l1");
        assert_eq!(projection.edges[0].target, "n2");

        // From the root the same pin faces outward again
        let root = project(&board, None, &HashSet::new());
        assert_eq!(root.pin_cache.get("l1/in").unwrap().pin_type(), PinType::Input);
        assert!(root.edge("n1/text-l1/in").is_some());
    }

    #[test]
    fn test_selected_execution_edge_stops_animating() {
        let selection = HashSet::from(["n1/exec-n3/exec".to_string(), "n3".to_string()]);
        let projection = project(&board(), None, &selection);

        let edge = projection.edge("n1/exec-n3/exec").unwrap();
        assert!(edge.selected);
        assert!(!edge.animated);
        assert!(projection.node("n3").unwrap().selected);
        assert!(!projection.node("n1").unwrap().selected);
    }

    #[test]
    fn test_edges_are_deduplicated() {
        let projection = project(&board(), None, &HashSet::new());
        let mut ids: Vec<_> = projection.edges.iter().map(|e| e.id.clone()).collect();
        let total = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
