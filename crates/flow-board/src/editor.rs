//! Editor navigation and selection state
//!
//! Tracks which layer is open, the breadcrumb path that leads to it and the
//! selected entities. Navigating never mutates the board.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::projection::edge_id;
use crate::types::{Board, LayerId};

/// Separator of the layer path
pub const LAYER_PATH_SEPARATOR: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    /// Open layer; `None` is the root
    pub current_layer: Option<LayerId>,
    /// `/`-joined stack of open layer ids, `None` at the root
    pub layer_path: Option<String>,
    pub selection: HashSet<String>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open layer ids from the outermost in
    pub fn layer_stack(&self) -> Vec<&str> {
        self.layer_path
            .as_deref()
            .map(|path| {
                path.split(LAYER_PATH_SEPARATOR)
                    .filter(|segment| !segment.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enter a layer nested in the current scope
    pub fn push_layer(&mut self, layer_id: impl Into<String>) {
        let layer_id = layer_id.into();
        self.layer_path = Some(match self.layer_path.take() {
            Some(path) if !path.is_empty() => format!("{}{}{}", path, LAYER_PATH_SEPARATOR, layer_id),
            _ => layer_id.clone(),
        });
        self.current_layer = Some(layer_id);
        self.selection.clear();
    }

    /// Leave the current layer for its parent
    ///
    /// Returns false when already at the root.
    pub fn pop_layer(&mut self) -> bool {
        let mut stack: Vec<String> = self.layer_stack().into_iter().map(String::from).collect();
        if stack.pop().is_none() {
            return false;
        }
        self.apply_stack(stack);
        self.selection.clear();
        true
    }

    /// Jump to a path, e.g. from a breadcrumb; `None` or empty opens the root
    pub fn set_layer_path(&mut self, path: Option<&str>) {
        let stack = path
            .unwrap_or_default()
            .split(LAYER_PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();
        self.apply_stack(stack);
        self.selection.clear();
    }

    fn apply_stack(&mut self, stack: Vec<String>) {
        self.current_layer = stack.last().cloned();
        self.layer_path = if stack.is_empty() {
            None
        } else {
            Some(stack.join(LAYER_PATH_SEPARATOR))
        };
    }

    /// Replace the selection
    pub fn select<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = ids.into_iter().map(Into::into).collect();
    }

    pub fn toggle_selected(&mut self, id: &str) {
        if !self.selection.remove(id) {
            self.selection.insert(id.to_string());
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    /// Adjust to a fresh snapshot
    ///
    /// Layers that no longer exist are closed, innermost first, and the
    /// selection drops entities that are gone. Returns whether the open
    /// layer changed.
    pub fn reconcile(&mut self, board: &Board) -> bool {
        let stack: Vec<String> = self.layer_stack().into_iter().map(String::from).collect();
        let valid = stack
            .iter()
            .take_while(|id| board.layers.contains_key(id.as_str()))
            .count();
        let changed = valid < stack.len();
        if changed {
            log::debug!(
                "Open layer '{}' no longer exists, closing",
                self.current_layer.as_deref().unwrap_or_default()
            );
            self.apply_stack(stack.into_iter().take(valid).collect());
        }

        let edges = edge_ids(board);
        self.selection
            .retain(|id| board.contains_id(id) || edges.contains(id.as_str()));
        changed
    }
}

/// Ids of every edge on the board, in any scope
fn edge_ids(board: &Board) -> HashSet<String> {
    board
        .nodes
        .values()
        .chain(board.layers.values().flat_map(|l| l.nodes.values()))
        .flat_map(|n| n.pins.values())
        .chain(board.layers.values().flat_map(|l| l.pins.values()))
        .flat_map(|pin| pin.connected_to.iter().map(move |to| edge_id(&pin.id, to)))
        .collect()
}
