use serde::{Deserialize, Serialize};

use super::BoardCommand;
use crate::error::{BoardError, Result};
use crate::types::Board;

fn check_operands(ids: [&str; 4]) -> Result<()> {
    if ids.iter().any(|id| id.is_empty()) {
        return Err(BoardError::invalid(
            "connections need a source node, source pin, target node and target pin",
        ));
    }
    Ok(())
}

/// Connect an output pin to an input pin
///
/// Node ids name the owning entity of each pin, which may be a node or a
/// layer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPins {
    pub from_node: String,
    pub from_pin: String,
    pub to_node: String,
    pub to_pin: String,
}

impl ConnectPins {
    pub fn new(
        from_node: impl Into<String>,
        from_pin: impl Into<String>,
        to_node: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Result<Self> {
        let command = Self {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
        };
        check_operands([
            &command.from_node,
            &command.from_pin,
            &command.to_node,
            &command.to_pin,
        ])?;
        Ok(command)
    }
}

fn connect(board: &mut Board, from: &str, to: &str) -> Result<()> {
    let source = board
        .find_pin(from)
        .ok_or_else(|| BoardError::PinNotFound(from.to_string()))?;
    if board.find_pin(to).is_none() {
        return Err(BoardError::PinNotFound(to.to_string()));
    }
    if source.connected_to.contains(to) {
        return Err(BoardError::AlreadyConnected {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    board.link(from, to);
    Ok(())
}

fn disconnect(board: &mut Board, from: &str, to: &str) -> Result<()> {
    let source = board
        .find_pin(from)
        .ok_or_else(|| BoardError::PinNotFound(from.to_string()))?;
    let target = board
        .find_pin(to)
        .ok_or_else(|| BoardError::PinNotFound(to.to_string()))?;
    if !source.connected_to.contains(to) && !target.depends_on.contains(from) {
        return Err(BoardError::NotConnected {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    board.unlink(from, to);
    Ok(())
}

impl BoardCommand for ConnectPins {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        connect(board, &self.from_pin, &self.to_pin)
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        disconnect(board, &self.from_pin, &self.to_pin)
    }
}

/// Remove the connection between an output pin and an input pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectPins {
    pub from_node: String,
    pub from_pin: String,
    pub to_node: String,
    pub to_pin: String,
}

impl DisconnectPins {
    pub fn new(
        from_node: impl Into<String>,
        from_pin: impl Into<String>,
        to_node: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Result<Self> {
        let command = Self {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
        };
        check_operands([
            &command.from_node,
            &command.from_pin,
            &command.to_node,
            &command.to_pin,
        ])?;
        Ok(command)
    }
}

impl BoardCommand for DisconnectPins {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        disconnect(board, &self.from_pin, &self.to_pin)
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        connect(board, &self.from_pin, &self.to_pin)
    }
}
