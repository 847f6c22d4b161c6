use serde::{Deserialize, Serialize};

use super::BoardCommand;
use crate::error::{BoardError, Result};
use crate::types::{Board, Coordinates, LayerId, Node, NodeId};

/// Place a node on the board
///
/// The first application turns the node into a concrete instance with fresh
/// node and pin ids; re-applying (redo) keeps those ids so later commands
/// that reference them stay valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNode {
    pub node: Node,
    #[serde(default)]
    pub current_layer: Option<LayerId>,
    #[serde(default)]
    pub instantiated: bool,
}

impl AddNode {
    pub fn new(node: Node, current_layer: Option<LayerId>) -> Self {
        Self {
            node,
            current_layer,
            instantiated: false,
        }
    }

    /// Add a node whose ids are already final
    pub fn concrete(node: Node, current_layer: Option<LayerId>) -> Self {
        Self {
            node,
            current_layer,
            instantiated: true,
        }
    }
}

impl BoardCommand for AddNode {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        let layer = self.current_layer.clone();
        if !board.has_scope(layer.as_deref()) {
            return Err(BoardError::LayerNotFound(layer.unwrap_or_default()));
        }

        if !self.instantiated {
            self.node.instantiate();
            self.instantiated = true;
        }

        if board.contains_id(&self.node.id) {
            return Err(BoardError::DuplicateId(self.node.id.clone()));
        }
        if let Some(pin) = self.node.pins.keys().find(|id| board.find_pin(id).is_some()) {
            return Err(BoardError::DuplicateId(pin.clone()));
        }

        let node = self.node.clone();
        board.reattach_pins(node.pins.values());
        if let Some(scope) = board.scope_mut(layer.as_deref()) {
            scope.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_node(&self.node.id)
            .ok_or_else(|| BoardError::NodeNotFound(self.node.id.clone()))?;
        let removed = board
            .scope_mut(layer.as_deref())
            .and_then(|scope| scope.nodes.remove(&self.node.id));
        if let Some(removed) = removed {
            board.detach_pins(removed.pins.values());
        }
        Ok(())
    }
}

/// Remove a node and sever its connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveNode {
    pub node_id: NodeId,
    /// The removed node, with its connection sets intact
    #[serde(default)]
    pub removed: Option<Node>,
    /// Scope the node was removed from
    #[serde(default)]
    pub layer: Option<LayerId>,
}

impl RemoveNode {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            removed: None,
            layer: None,
        }
    }
}

impl BoardCommand for RemoveNode {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_node(&self.node_id)
            .ok_or_else(|| BoardError::NodeNotFound(self.node_id.clone()))?;
        let node = board
            .scope_mut(layer.as_deref())
            .and_then(|scope| scope.nodes.remove(&self.node_id))
            .ok_or_else(|| BoardError::NodeNotFound(self.node_id.clone()))?;

        board.detach_pins(node.pins.values());
        self.removed = Some(node);
        self.layer = layer;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let node = self
            .removed
            .clone()
            .ok_or_else(|| BoardError::invalid("RemoveNode was never applied"))?;
        if board.contains_id(&node.id) {
            return Err(BoardError::DuplicateId(node.id));
        }
        let layer = self.layer.clone();
        if !board.has_scope(layer.as_deref()) {
            return Err(BoardError::LayerNotFound(layer.unwrap_or_default()));
        }

        board.reattach_pins(node.pins.values());
        if let Some(scope) = board.scope_mut(layer.as_deref()) {
            scope.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }
}

/// Move a node, or a layer in its parent scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveNode {
    pub node_id: NodeId,
    pub to: Coordinates,
    #[serde(default)]
    pub from: Option<Coordinates>,
}

impl MoveNode {
    pub fn new(node_id: impl Into<String>, to: Coordinates) -> Self {
        Self {
            node_id: node_id.into(),
            to,
            from: None,
        }
    }

    fn coordinates_mut<'a>(&self, board: &'a mut Board) -> Result<&'a mut Coordinates> {
        if board.layers.contains_key(&self.node_id) {
            return board
                .layers
                .get_mut(&self.node_id)
                .map(|layer| &mut layer.coordinates)
                .ok_or_else(|| BoardError::LayerNotFound(self.node_id.clone()));
        }
        board
            .find_node_mut(&self.node_id)
            .map(|node| &mut node.coordinates)
            .ok_or_else(|| BoardError::NodeNotFound(self.node_id.clone()))
    }
}

impl BoardCommand for MoveNode {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        let coordinates = self.coordinates_mut(board)?;
        let previous = *coordinates;
        *coordinates = self.to;
        self.from = Some(previous);
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let from = self
            .from
            .ok_or_else(|| BoardError::invalid("MoveNode was never applied"))?;
        let coordinates = self.coordinates_mut(board)?;
        *coordinates = from;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BoardBuilder, NodeBuilder};
    use crate::commands::{BoardCommand, ConnectPins};
    use crate::pin::DataType;
    use crate::types::Layer;

    fn template() -> Node {
        NodeBuilder::new("tpl", "control_branch")
            .input("exec", DataType::Execution)
            .output("true", DataType::Boolean)
            .build()
    }

    #[test]
    fn test_add_node_instantiates_once() {
        let mut board = Board::new("b", "Board");
        let mut command = AddNode::new(template(), None);
        command.apply(&mut board).unwrap();

        let id = command.node.id.clone();
        assert_ne!(id, "tpl");
        assert!(board.nodes.contains_key(&id));

        command.revert(&mut board).unwrap();
        assert!(board.nodes.is_empty());

        // Redo keeps the ids
        command.apply(&mut board).unwrap();
        assert_eq!(command.node.id, id);
        assert!(board.nodes.contains_key(&id));
    }

    #[test]
    fn test_add_node_into_layer() {
        let mut board = BoardBuilder::new("b", "Board")
            .add_layer(Layer::new("l1", "Layer"))
            .build();
        let mut command = AddNode::new(template(), Some("l1".into()));
        command.apply(&mut board).unwrap();

        assert!(board.nodes.is_empty());
        assert!(board.layers["l1"].nodes.contains_key(&command.node.id));
    }

    #[test]
    fn test_add_node_unknown_layer() {
        let mut board = Board::new("b", "Board");
        let mut command = AddNode::new(template(), Some("nope".into()));
        assert!(matches!(
            command.apply(&mut board),
            Err(BoardError::LayerNotFound(_))
        ));
        assert!(!command.instantiated);
    }

    #[test]
    fn test_remove_node_restores_connections() {
        let mut board = BoardBuilder::new("b", "Board")
            .add_node(NodeBuilder::new("a", "src").output("out", DataType::String).build())
            .add_node(NodeBuilder::new("b", "dst").input("in", DataType::String).build())
            .build();
        ConnectPins::new("a", "a/out", "b", "b/in")
            .unwrap()
            .apply(&mut board)
            .unwrap();
        let connected = board.clone();

        let mut remove = RemoveNode::new("b");
        remove.apply(&mut board).unwrap();
        assert!(board.find_node("b").is_none());
        assert!(board.find_pin("a/out").unwrap().connected_to.is_empty());

        remove.revert(&mut board).unwrap();
        assert_eq!(board, connected);
    }

    #[test]
    fn test_move_node_and_layer() {
        let mut layer = Layer::new("l1", "Layer");
        layer.coordinates = (1.0, 1.0, 0.0);
        let mut board = BoardBuilder::new("b", "Board")
            .add_node(NodeBuilder::new("a", "src").at(10.0, 20.0).build())
            .add_layer(layer)
            .build();

        let mut move_node = MoveNode::new("a", (50.0, 60.0, 0.0));
        move_node.apply(&mut board).unwrap();
        assert_eq!(board.nodes["a"].coordinates, (50.0, 60.0, 0.0));
        move_node.revert(&mut board).unwrap();
        assert_eq!(board.nodes["a"].coordinates, (10.0, 20.0, 0.0));

        let mut move_layer = MoveNode::new("l1", (9.0, 9.0, 0.0));
        move_layer.apply(&mut board).unwrap();
        assert_eq!(board.layers["l1"].coordinates, (9.0, 9.0, 0.0));
        move_layer.revert(&mut board).unwrap();
        assert_eq!(board.layers["l1"].coordinates, (1.0, 1.0, 0.0));

        assert!(MoveNode::new("ghost", (0.0, 0.0, 0.0)).apply(&mut board).is_err());
    }
}
