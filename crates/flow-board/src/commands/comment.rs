use serde::{Deserialize, Serialize};

use super::BoardCommand;
use crate::error::{BoardError, Result};
use crate::types::{new_id, Board, Comment, LayerId};

/// Create a comment or replace an existing one
///
/// An empty id is replaced by a generated one on first application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertComment {
    pub comment: Comment,
    #[serde(default)]
    pub current_layer: Option<LayerId>,
    /// The comment that was replaced, if any
    #[serde(default)]
    pub previous: Option<Comment>,
}

impl UpsertComment {
    pub fn new(comment: Comment, current_layer: Option<LayerId>) -> Self {
        Self {
            comment,
            current_layer,
            previous: None,
        }
    }

    /// Scope the comment lives in: its current scope when it already exists
    fn target_scope(&self, board: &Board) -> Result<Option<LayerId>> {
        if let Some(existing) = board.locate_comment(&self.comment.id) {
            return Ok(existing);
        }
        if !board.has_scope(self.current_layer.as_deref()) {
            return Err(BoardError::LayerNotFound(
                self.current_layer.clone().unwrap_or_default(),
            ));
        }
        Ok(self.current_layer.clone())
    }
}

impl BoardCommand for UpsertComment {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        if self.comment.id.is_empty() {
            self.comment.id = new_id();
        }
        let existing = board.locate_comment(&self.comment.id).is_some();
        if !existing && board.contains_id(&self.comment.id) {
            return Err(BoardError::DuplicateId(self.comment.id.clone()));
        }

        let layer = self.target_scope(board)?;
        let previous = board
            .scope_mut(layer.as_deref())
            .and_then(|scope| scope.comments.insert(self.comment.id.clone(), self.comment.clone()));
        self.previous = previous;
        self.current_layer = layer;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_comment(&self.comment.id)
            .ok_or_else(|| BoardError::CommentNotFound(self.comment.id.clone()))?;
        let previous = self.previous.clone();
        if let Some(scope) = board.scope_mut(layer.as_deref()) {
            match previous {
                Some(previous) => {
                    scope.comments.insert(previous.id.clone(), previous);
                }
                None => {
                    scope.comments.remove(&self.comment.id);
                }
            }
        }
        Ok(())
    }
}

/// Delete a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveComment {
    pub comment_id: String,
    #[serde(default)]
    pub removed: Option<Comment>,
    #[serde(default)]
    pub layer: Option<LayerId>,
}

impl RemoveComment {
    pub fn new(comment_id: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            removed: None,
            layer: None,
        }
    }
}

impl BoardCommand for RemoveComment {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_comment(&self.comment_id)
            .ok_or_else(|| BoardError::CommentNotFound(self.comment_id.clone()))?;
        let removed = board
            .scope_mut(layer.as_deref())
            .and_then(|scope| scope.comments.remove(&self.comment_id))
            .ok_or_else(|| BoardError::CommentNotFound(self.comment_id.clone()))?;
        self.removed = Some(removed);
        self.layer = layer;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let comment = self
            .removed
            .clone()
            .ok_or_else(|| BoardError::invalid("RemoveComment was never applied"))?;
        if board.contains_id(&comment.id) {
            return Err(BoardError::DuplicateId(comment.id));
        }
        let layer = self.layer.clone();
        let scope = board
            .scope_mut(layer.as_deref())
            .ok_or_else(|| BoardError::LayerNotFound(layer.clone().unwrap_or_default()))?;
        scope.comments.insert(comment.id.clone(), comment);
        Ok(())
    }
}
