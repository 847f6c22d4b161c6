use serde::{Deserialize, Serialize};

use super::BoardCommand;
use crate::error::{BoardError, Result};
use crate::pin::Pin;
use crate::types::{new_id, Board, Layer, LayerId};

/// Boundary pins and the pins of every node directly inside a layer
fn layer_pins(layer: &Layer) -> impl Iterator<Item = &Pin> + '_ {
    layer
        .pins
        .values()
        .chain(layer.nodes.values().flat_map(|n| n.pins.values()))
}

/// Create a layer, or update the metadata and boundary pins of an existing one
///
/// When the layer is new it is placed in `current_layer`, and the nodes,
/// child layers and comments listed in `node_ids`/`comment_ids` are moved
/// from that scope into it. For an existing layer only its name, position,
/// color and boundary pins change; boundary pins that survive keep their
/// connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertLayer {
    pub layer: Layer,
    #[serde(default)]
    pub current_layer: Option<LayerId>,
    /// Nodes or child layers of the current scope to collapse into a new layer
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub comment_ids: Vec<String>,
    /// The layer as it was before an update; `None` when the layer was created
    #[serde(default)]
    pub previous: Option<Layer>,
}

impl UpsertLayer {
    pub fn new(layer: Layer, current_layer: Option<LayerId>) -> Self {
        Self {
            layer,
            current_layer,
            node_ids: Vec::new(),
            comment_ids: Vec::new(),
            previous: None,
        }
    }

    /// Collapse existing entities of the current scope into the new layer
    pub fn collapsing(mut self, node_ids: Vec<String>, comment_ids: Vec<String>) -> Self {
        self.node_ids = node_ids;
        self.comment_ids = comment_ids;
        self
    }

    fn materialize_ids(&mut self) {
        if self.layer.id.is_empty() {
            self.layer.id = new_id();
        }
        self.layer.pins = std::mem::take(&mut self.layer.pins)
            .into_values()
            .map(|mut pin| {
                if pin.id.is_empty() {
                    pin.id = new_id();
                }
                (pin.id.clone(), pin)
            })
            .collect();
    }

    fn create(&mut self, board: &mut Board) -> Result<()> {
        let scope = self.current_layer.clone();
        if !board.has_scope(scope.as_deref()) {
            return Err(BoardError::LayerNotFound(scope.unwrap_or_default()));
        }
        if board.contains_id(&self.layer.id) {
            return Err(BoardError::DuplicateId(self.layer.id.clone()));
        }
        if let Some(node) = self.layer.nodes.keys().find(|id| board.contains_id(id)) {
            return Err(BoardError::DuplicateId(node.clone()));
        }
        if let Some(pin) = layer_pins(&self.layer).find(|p| board.find_pin(&p.id).is_some()) {
            return Err(BoardError::DuplicateId(pin.id.clone()));
        }
        for id in &self.node_ids {
            let node_in_scope = board.locate_node(id).as_ref() == Some(&scope);
            let layer_in_scope = board.layers.get(id).is_some_and(|l| l.parent_id == scope);
            if !node_in_scope && !layer_in_scope {
                return Err(BoardError::NodeNotFound(id.clone()));
            }
        }
        if let Some(id) = self
            .comment_ids
            .iter()
            .find(|id| board.locate_comment(id).as_ref() != Some(&scope))
        {
            return Err(BoardError::CommentNotFound(id.clone()));
        }

        let mut layer = self.layer.clone();
        layer.parent_id = scope.clone();
        for pin in layer.pins.values_mut() {
            pin.connected_to.clear();
            pin.depends_on.clear();
        }
        let carried: Vec<Pin> = layer_pins(&layer).cloned().collect();
        let layer_id = layer.id.clone();
        board.layers.insert(layer_id.clone(), layer);
        board.reattach_pins(carried.iter());

        for id in &self.node_ids {
            if let Some(child) = board.layers.get_mut(id) {
                child.parent_id = Some(layer_id.clone());
                continue;
            }
            let node = board
                .scope_mut(scope.as_deref())
                .and_then(|source| source.nodes.remove(id));
            if let (Some(node), Some(target)) = (node, board.layers.get_mut(&layer_id)) {
                target.nodes.insert(id.clone(), node);
            }
        }
        for id in &self.comment_ids {
            let comment = board
                .scope_mut(scope.as_deref())
                .and_then(|source| source.comments.remove(id));
            if let (Some(comment), Some(target)) = (comment, board.layers.get_mut(&layer_id)) {
                target.comments.insert(id.clone(), comment);
            }
        }

        self.previous = None;
        Ok(())
    }

    fn update(&mut self, board: &mut Board) -> Result<()> {
        let existing = board
            .layers
            .get(&self.layer.id)
            .cloned()
            .ok_or_else(|| BoardError::LayerNotFound(self.layer.id.clone()))?;
        if let Some(pin) = self
            .layer
            .pins
            .keys()
            .find(|id| !existing.pins.contains_key(*id) && board.find_pin(id).is_some())
        {
            return Err(BoardError::DuplicateId(pin.clone()));
        }

        let mut pins = self.layer.pins.clone();
        for pin in pins.values_mut() {
            match existing.pins.get(&pin.id) {
                Some(old) => {
                    pin.connected_to = old.connected_to.clone();
                    pin.depends_on = old.depends_on.clone();
                }
                None => {
                    pin.connected_to.clear();
                    pin.depends_on.clear();
                }
            }
        }
        let dropped: Vec<Pin> = existing
            .pins
            .values()
            .filter(|p| !pins.contains_key(&p.id))
            .cloned()
            .collect();

        board.detach_pins(dropped.iter());
        if let Some(stored) = board.layers.get_mut(&self.layer.id) {
            stored.name = self.layer.name.clone();
            stored.coordinates = self.layer.coordinates;
            stored.color = self.layer.color.clone();
            stored.pins = pins;
        }
        self.previous = Some(existing);
        Ok(())
    }

    fn revert_create(&mut self, board: &mut Board) -> Result<()> {
        let scope = self.current_layer.clone();
        let layer_id = self.layer.id.clone();
        if !board.layers.contains_key(&layer_id) {
            return Err(BoardError::LayerNotFound(layer_id));
        }
        if !board.has_scope(scope.as_deref()) {
            return Err(BoardError::LayerNotFound(scope.unwrap_or_default()));
        }

        for id in &self.node_ids {
            if let Some(child) = board.layers.get_mut(id) {
                if child.parent_id.as_deref() == Some(layer_id.as_str()) {
                    child.parent_id = scope.clone();
                }
                continue;
            }
            let node = board
                .layers
                .get_mut(&layer_id)
                .and_then(|layer| layer.nodes.remove(id));
            if let (Some(node), Some(target)) = (node, board.scope_mut(scope.as_deref())) {
                target.nodes.insert(id.clone(), node);
            }
        }
        for id in &self.comment_ids {
            let comment = board
                .layers
                .get_mut(&layer_id)
                .and_then(|layer| layer.comments.remove(id));
            if let (Some(comment), Some(target)) = (comment, board.scope_mut(scope.as_deref())) {
                target.comments.insert(id.clone(), comment);
            }
        }

        if let Some(removed) = board.layers.remove(&layer_id) {
            board.detach_pins(layer_pins(&removed));
        }
        Ok(())
    }

    fn revert_update(&mut self, board: &mut Board, previous: Layer) -> Result<()> {
        let current = board
            .layers
            .get(&previous.id)
            .ok_or_else(|| BoardError::LayerNotFound(previous.id.clone()))?;
        let added: Vec<Pin> = current
            .pins
            .values()
            .filter(|p| !previous.pins.contains_key(&p.id))
            .cloned()
            .collect();

        board.detach_pins(added.iter());
        if let Some(stored) = board.layers.get_mut(&previous.id) {
            stored.name = previous.name.clone();
            stored.coordinates = previous.coordinates;
            stored.color = previous.color.clone();
            stored.pins = previous.pins.clone();
        }
        board.reattach_pins(previous.pins.values());
        Ok(())
    }
}

impl BoardCommand for UpsertLayer {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        self.materialize_ids();
        if board.layers.contains_key(&self.layer.id) {
            self.update(board)
        } else {
            self.create(board)
        }
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        match self.previous.clone() {
            Some(previous) => self.revert_update(board, previous),
            None => self.revert_create(board),
        }
    }
}

/// Delete a layer together with everything nested inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveLayer {
    pub layer_id: LayerId,
    /// Removed layers, the target first
    #[serde(default)]
    pub removed: Vec<Layer>,
}

impl RemoveLayer {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            removed: Vec::new(),
        }
    }
}

impl BoardCommand for RemoveLayer {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        if !board.layers.contains_key(&self.layer_id) {
            return Err(BoardError::LayerNotFound(self.layer_id.clone()));
        }
        let removed: Vec<Layer> = board
            .layer_subtree(&self.layer_id)
            .iter()
            .filter_map(|id| board.layers.remove(id))
            .collect();
        board.detach_pins(removed.iter().flat_map(|layer| layer_pins(layer)));
        log::debug!(
            "Removed layer '{}' with {} nested layer(s)",
            self.layer_id,
            removed.len().saturating_sub(1)
        );
        self.removed = removed;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let root = self
            .removed
            .first()
            .ok_or_else(|| BoardError::invalid("RemoveLayer was never applied"))?;
        if !board.has_scope(root.parent_id.as_deref()) {
            return Err(BoardError::LayerNotFound(
                root.parent_id.clone().unwrap_or_default(),
            ));
        }
        if let Some(layer) = self.removed.iter().find(|l| board.contains_id(&l.id)) {
            return Err(BoardError::DuplicateId(layer.id.clone()));
        }

        for layer in &self.removed {
            board.layers.insert(layer.id.clone(), layer.clone());
        }
        board.reattach_pins(self.removed.iter().flat_map(|layer| layer_pins(layer)));
        Ok(())
    }
}
