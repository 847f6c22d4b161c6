use serde::{Deserialize, Serialize};

use super::BoardCommand;
use crate::error::{BoardError, Result};
use crate::types::{new_id, Board, LayerId, Variable};

/// Create a variable or replace an existing one in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertVariable {
    pub variable: Variable,
    #[serde(default)]
    pub current_layer: Option<LayerId>,
    #[serde(default)]
    pub previous: Option<Variable>,
}

impl UpsertVariable {
    pub fn new(variable: Variable, current_layer: Option<LayerId>) -> Self {
        Self {
            variable,
            current_layer,
            previous: None,
        }
    }
}

impl BoardCommand for UpsertVariable {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        if self.variable.id.is_empty() {
            self.variable.id = new_id();
        }
        let layer = match board.locate_variable(&self.variable.id) {
            Some(existing) => existing,
            None => {
                if board.contains_id(&self.variable.id) {
                    return Err(BoardError::DuplicateId(self.variable.id.clone()));
                }
                self.current_layer.clone()
            }
        };
        let scope = board
            .scope_mut(layer.as_deref())
            .ok_or_else(|| BoardError::LayerNotFound(layer.clone().unwrap_or_default()))?;
        self.previous = scope
            .variables
            .insert(self.variable.id.clone(), self.variable.clone());
        self.current_layer = layer;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_variable(&self.variable.id)
            .ok_or_else(|| BoardError::VariableNotFound(self.variable.id.clone()))?;
        if let Some(scope) = board.scope_mut(layer.as_deref()) {
            match self.previous.clone() {
                Some(previous) => {
                    scope.variables.insert(previous.id.clone(), previous);
                }
                None => {
                    scope.variables.remove(&self.variable.id);
                }
            }
        }
        Ok(())
    }
}

/// Delete a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveVariable {
    pub variable_id: String,
    #[serde(default)]
    pub removed: Option<Variable>,
    #[serde(default)]
    pub layer: Option<LayerId>,
}

impl RemoveVariable {
    pub fn new(variable_id: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            removed: None,
            layer: None,
        }
    }
}

impl BoardCommand for RemoveVariable {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        let layer = board
            .locate_variable(&self.variable_id)
            .ok_or_else(|| BoardError::VariableNotFound(self.variable_id.clone()))?;
        self.removed = board
            .scope_mut(layer.as_deref())
            .and_then(|scope| scope.variables.remove(&self.variable_id));
        self.layer = layer;
        Ok(())
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        let variable = self
            .removed
            .clone()
            .ok_or_else(|| BoardError::invalid("RemoveVariable was never applied"))?;
        if board.contains_id(&variable.id) {
            return Err(BoardError::DuplicateId(variable.id));
        }
        let layer = self.layer.clone();
        let scope = board
            .scope_mut(layer.as_deref())
            .ok_or_else(|| BoardError::LayerNotFound(layer.clone().unwrap_or_default()))?;
        scope.variables.insert(variable.id.clone(), variable);
        Ok(())
    }
}
