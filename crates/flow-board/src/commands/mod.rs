//! Command model
//!
//! Every edit to a board is a [`Command`]: a serializable record naming the
//! operation and its operands. Commands are the unit of network
//! transmission and of undo/redo.
//!
//! Applying a command fills in whatever it needs to be inverted later (the
//! removed node, the previous comment, generated ids, ...). The applied
//! command returned by the backend is what gets pushed on the history, and
//! sending it back for undo reverts exactly that change.
//!
//! Both `apply` and `revert` are atomic: they validate everything before the
//! first mutation, so on error the board is unchanged.

mod comment;
mod layer;
mod node;
mod pins;
mod variable;

pub use comment::{RemoveComment, UpsertComment};
pub use layer::{RemoveLayer, UpsertLayer};
pub use node::{AddNode, MoveNode, RemoveNode};
pub use pins::{ConnectPins, DisconnectPins};
pub use variable::{RemoveVariable, UpsertVariable};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Board;

/// An invertible board mutation
pub trait BoardCommand {
    /// Apply the command, recording what is needed to revert it
    fn apply(&mut self, board: &mut Board) -> Result<()>;

    /// Undo a previously applied command
    fn revert(&mut self, board: &mut Board) -> Result<()>;
}

/// All graph mutations understood by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type")]
pub enum Command {
    AddNode(AddNode),
    RemoveNode(RemoveNode),
    ConnectPins(ConnectPins),
    DisconnectPins(DisconnectPins),
    MoveNode(MoveNode),
    UpsertComment(UpsertComment),
    RemoveComment(RemoveComment),
    UpsertLayer(UpsertLayer),
    RemoveLayer(RemoveLayer),
    UpsertVariable(UpsertVariable),
    RemoveVariable(RemoveVariable),
}

impl Command {
    /// Short operation name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddNode(_) => "AddNode",
            Self::RemoveNode(_) => "RemoveNode",
            Self::ConnectPins(_) => "ConnectPins",
            Self::DisconnectPins(_) => "DisconnectPins",
            Self::MoveNode(_) => "MoveNode",
            Self::UpsertComment(_) => "UpsertComment",
            Self::RemoveComment(_) => "RemoveComment",
            Self::UpsertLayer(_) => "UpsertLayer",
            Self::RemoveLayer(_) => "RemoveLayer",
            Self::UpsertVariable(_) => "UpsertVariable",
            Self::RemoveVariable(_) => "RemoveVariable",
        }
    }

    fn inner(&mut self) -> &mut dyn BoardCommand {
        match self {
            Self::AddNode(c) => c,
            Self::RemoveNode(c) => c,
            Self::ConnectPins(c) => c,
            Self::DisconnectPins(c) => c,
            Self::MoveNode(c) => c,
            Self::UpsertComment(c) => c,
            Self::RemoveComment(c) => c,
            Self::UpsertLayer(c) => c,
            Self::RemoveLayer(c) => c,
            Self::UpsertVariable(c) => c,
            Self::RemoveVariable(c) => c,
        }
    }
}

impl BoardCommand for Command {
    fn apply(&mut self, board: &mut Board) -> Result<()> {
        log::debug!("Applying {} to board '{}'", self.name(), board.id);
        self.inner().apply(board)
    }

    fn revert(&mut self, board: &mut Board) -> Result<()> {
        log::debug!("Reverting {} on board '{}'", self.name(), board.id);
        self.inner().revert(board)
    }
}

macro_rules! impl_from_command {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(command: $variant) -> Self {
                    Command::$variant(command)
                }
            }
        )*
    };
}

impl_from_command!(
    AddNode,
    RemoveNode,
    ConnectPins,
    DisconnectPins,
    MoveNode,
    UpsertComment,
    RemoveComment,
    UpsertLayer,
    RemoveLayer,
    UpsertVariable,
    RemoveVariable,
);

/// Apply a batch atomically
///
/// The batch runs on a copy of the board which replaces the original only
/// if every command succeeds.
pub fn apply_all(board: &mut Board, commands: &mut [Command]) -> Result<()> {
    let mut working = board.clone();
    for command in commands.iter_mut() {
        command.apply(&mut working)?;
    }
    *board = working;
    Ok(())
}

/// Revert a batch atomically, last command first
pub fn revert_all(board: &mut Board, commands: &mut [Command]) -> Result<()> {
    let mut working = board.clone();
    for command in commands.iter_mut().rev() {
        command.revert(&mut working)?;
    }
    *board = working;
    Ok(())
}
