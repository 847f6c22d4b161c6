//! Backend seam
//!
//! The backend is the authoritative store of committed board state. A
//! session never mutates its board locally; it sends commands through this
//! trait and re-fetches the snapshot afterwards.

use async_trait::async_trait;

use crate::commands::Command;
use crate::error::Result;
use crate::runs::{RunMetadata, RunRequest, RunUpdate};
use crate::types::{Board, Node, Version};

/// Callbacks for a board run in progress
pub trait RunObserver: Send + Sync {
    /// The backend accepted the run
    fn on_start(&self, run_id: &str);

    /// A streamed update arrived
    fn on_update(&self, update: &RunUpdate);
}

/// Observer that ignores all run callbacks
pub struct NullRunObserver;

impl RunObserver for NullRunObserver {
    fn on_start(&self, _run_id: &str) {}

    fn on_update(&self, _update: &RunUpdate) {}
}

/// Remote source of truth for boards, catalog and runs
///
/// Applied results are the commands as the backend applied them, carrying
/// any materialized state (generated ids, removed entities, previous
/// values). Those are what the history stores and what undo sends back.
#[async_trait]
pub trait BoardBackend: Send + Sync {
    /// Available node templates
    async fn get_catalog(&self) -> Result<Vec<Node>>;

    /// Fetch a board snapshot, optionally pinned to a historical version
    async fn get_board(&self, app_id: &str, board_id: &str, version: Option<Version>) -> Result<Board>;

    async fn execute_command(&self, app_id: &str, board_id: &str, command: Command) -> Result<Command>;

    /// Apply a batch atomically
    async fn execute_commands(
        &self,
        app_id: &str,
        board_id: &str,
        commands: Vec<Command>,
    ) -> Result<Vec<Command>>;

    /// Revert a batch of applied commands, last first
    async fn undo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> Result<()>;

    /// Re-apply a batch of previously undone commands
    async fn redo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> Result<()>;

    /// Run the board from an entry node
    ///
    /// When `stream` is set, progress is reported to the observer while the
    /// run executes.
    async fn execute_board(
        &self,
        app_id: &str,
        board_id: &str,
        request: RunRequest,
        stream: bool,
        observer: &dyn RunObserver,
    ) -> Result<RunMetadata>;
}
