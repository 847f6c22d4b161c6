//! Board editing session
//!
//! A [`BoardSession`] is the editor's view of one board: the latest snapshot
//! fetched from the backend, its projection for the open layer, navigation
//! and selection state, and the undo/redo history. Every edit goes through
//! the backend; the local snapshot only changes by re-fetching after a
//! confirmed round trip.
//!
//! One command is expected in flight at a time. Issuing a second edit before
//! the first returns is allowed, and the backend decides the final state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::{BoardBackend, RunObserver};
use crate::catalog::Catalog;
use crate::commands::{
    AddNode, Command, DisconnectPins, MoveNode, RemoveComment, RemoveLayer, RemoveNode,
    UpsertComment, UpsertLayer,
};
use crate::config::SessionConfig;
use crate::editor::EditorState;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventSink, NotificationLevel, NullEventSink};
use crate::history::{CommandHistory, SharedHistory};
use crate::placement::{matching_layer_pin, matching_node_pin, placeholder_layer, DraggedPin};
use crate::projection::{project, PinCache, Projection};
use crate::runs::{RunMetadata, RunRegistry, RunRequest, RunUpdate, SharedRunRegistry};
use crate::types::{Board, Coordinates, Layer, LayerId, Node, Version};
use crate::validation::validate_connection;
use crate::viewport::{fit_view, viewport_key, Viewport, ViewportStore};

/// Editing session for one board of one app
pub struct BoardSession {
    backend: Arc<dyn BoardBackend>,
    app_id: String,
    board_id: String,
    /// Pinned historical version; the session is read-only while set
    version: Option<Version>,
    board: Board,
    editor: EditorState,
    projection: Projection,
    catalog: Catalog,
    history: SharedHistory,
    runs: SharedRunRegistry,
    event_sink: Arc<dyn EventSink>,
    viewports: Arc<ViewportStore>,
    config: SessionConfig,
}

impl BoardSession {
    /// Open the live state of a board
    pub async fn open(
        backend: Arc<dyn BoardBackend>,
        app_id: impl Into<String>,
        board_id: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::open_at(backend, app_id, board_id, None, config).await
    }

    /// Open a board, optionally pinned to a historical version
    pub async fn open_at(
        backend: Arc<dyn BoardBackend>,
        app_id: impl Into<String>,
        board_id: impl Into<String>,
        version: Option<Version>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let viewports = match &config.viewport_store_path {
            Some(path) => {
                let store = ViewportStore::with_persistence(path);
                store.load_from_disk()?;
                store
            }
            None => ViewportStore::new(),
        };

        let mut session = Self {
            backend,
            app_id: app_id.into(),
            board_id: board_id.into(),
            version,
            board: Board::default(),
            editor: EditorState::new(),
            projection: Projection::default(),
            catalog: Catalog::new(),
            history: CommandHistory::shared(config.history_limit),
            runs: Arc::new(RunRegistry::new()),
            event_sink: Arc::new(NullEventSink),
            viewports: Arc::new(viewports),
            config,
        };
        session.refresh().await?;
        log::info!(
            "Opened board '{}' of app '{}'{}",
            session.board_id,
            session.app_id,
            version.map(|v| format!(" at version {}", v)).unwrap_or_default()
        );
        Ok(session)
    }

    /// Send events to the given sink instead of discarding them
    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Share undo/redo history with other sessions
    pub fn with_history(mut self, history: SharedHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_run_registry(mut self, runs: SharedRunRegistry) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_viewport_store(mut self, viewports: Arc<ViewportStore>) -> Self {
        self.viewports = viewports;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn is_read_only(&self) -> bool {
        self.version.is_some()
    }

    /// The latest snapshot
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn pin_cache(&self) -> &PinCache {
        &self.projection.pin_cache
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn runs(&self) -> &SharedRunRegistry {
        &self.runs
    }

    pub fn current_layer(&self) -> Option<&str> {
        self.editor.current_layer.as_deref()
    }

    pub fn layer_path(&self) -> Option<&str> {
        self.editor.layer_path.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo(&self.app_id, &self.board_id)
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo(&self.app_id, &self.board_id)
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Re-fetch the board and rebuild the projection
    pub async fn refresh(&mut self) -> Result<()> {
        let board = self
            .backend
            .get_board(&self.app_id, &self.board_id, self.version)
            .await?;
        self.board = board;
        let layer_changed = self.editor.reconcile(&self.board);
        self.reproject();

        let _ = self.event_sink.send(BoardEvent::BoardRefreshed {
            board_id: self.board_id.clone(),
            version: self.board.version,
        });
        if layer_changed {
            self.emit_layer_changed();
        }
        Ok(())
    }

    /// Pin the session to a historical version, or back to live with `None`
    pub async fn set_version(&mut self, version: Option<Version>) -> Result<()> {
        let previous = self.version;
        self.version = version;
        if let Err(e) = self.refresh().await {
            self.version = previous;
            self.notify_failure("Failed to load version", &e);
            return Err(e);
        }
        Ok(())
    }

    /// Fetch the node catalog from the backend
    pub async fn load_catalog(&mut self) -> Result<()> {
        let templates = self.backend.get_catalog().await?;
        log::debug!("Loaded {} catalog template(s)", templates.len());
        self.catalog = templates.into_iter().collect();
        Ok(())
    }

    fn reproject(&mut self) {
        self.projection = project(
            &self.board,
            self.editor.current_layer.as_deref(),
            &self.editor.selection,
        );
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if let Some(version) = self.version {
            let error = BoardError::ReadOnlyVersion { version };
            log::warn!("Rejected edit of board '{}': {}", self.board_id, error);
            let _ = self
                .event_sink
                .send(BoardEvent::notification(NotificationLevel::Warning, error.to_string()));
            return Err(error);
        }
        Ok(())
    }

    fn notify_failure(&self, action: &str, error: &BoardError) {
        log::warn!("{} on board '{}': {}", action, self.board_id, error);
        let _ = self
            .event_sink
            .send(BoardEvent::error(format!("{}: {}", action, error)));
    }

    fn emit_history(&self) {
        let (can_undo, can_redo) = {
            let history = self.history.lock();
            (
                history.can_undo(&self.app_id, &self.board_id),
                history.can_redo(&self.app_id, &self.board_id),
            )
        };
        let _ = self.event_sink.send(BoardEvent::HistoryChanged {
            board_id: self.board_id.clone(),
            can_undo,
            can_redo,
        });
    }

    fn emit_layer_changed(&self) {
        let _ = self.event_sink.send(BoardEvent::LayerChanged {
            board_id: self.board_id.clone(),
            current_layer: self.editor.current_layer.clone(),
            layer_path: self.editor.layer_path.clone(),
        });
    }

    fn emit_selection_changed(&self) {
        let mut selected: Vec<String> = self.editor.selection.iter().cloned().collect();
        selected.sort();
        let _ = self.event_sink.send(BoardEvent::SelectionChanged {
            board_id: self.board_id.clone(),
            selected,
        });
    }

    /// Refresh after a committed change; the change stands even if this fails
    async fn refresh_after_commit(&mut self) {
        if let Err(e) = self.refresh().await {
            self.notify_failure("Failed to refresh board", &e);
        }
    }

    /// Execute one command
    ///
    /// An `append` continuation joins the top history entry, so a compound
    /// interaction (place then wire) undoes in one step, and keeps the redo
    /// stack.
    pub async fn execute_command(&mut self, command: Command, append: bool) -> Result<Command> {
        self.ensure_writable()?;
        let name = command.name();
        match self
            .backend
            .execute_command(&self.app_id, &self.board_id, command)
            .await
        {
            Ok(applied) => {
                log::debug!("Executed {} on board '{}'", name, self.board_id);
                self.history
                    .lock()
                    .push(&self.app_id, &self.board_id, vec![applied.clone()], append);
                self.emit_history();
                self.refresh_after_commit().await;
                Ok(applied)
            }
            Err(e) => {
                self.notify_failure(&format!("Failed to execute {}", name), &e);
                Err(e)
            }
        }
    }

    /// Execute a batch atomically as one undo step
    ///
    /// An empty batch does nothing and never reaches the backend.
    pub async fn execute_commands(&mut self, commands: Vec<Command>, append: bool) -> Result<Vec<Command>> {
        self.ensure_writable()?;
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let count = commands.len();
        match self
            .backend
            .execute_commands(&self.app_id, &self.board_id, commands)
            .await
        {
            Ok(applied) => {
                log::debug!("Executed {} command(s) on board '{}'", count, self.board_id);
                self.history
                    .lock()
                    .push(&self.app_id, &self.board_id, applied.clone(), append);
                self.emit_history();
                self.refresh_after_commit().await;
                Ok(applied)
            }
            Err(e) => {
                self.notify_failure("Failed to execute commands", &e);
                Err(e)
            }
        }
    }

    /// Undo the last entry
    ///
    /// Returns false when there is nothing to undo. On failure the entry
    /// stays on the undo stack.
    pub async fn undo(&mut self) -> Result<bool> {
        self.ensure_writable()?;
        let entry = self.history.lock().pop_undo(&self.app_id, &self.board_id);
        let Some(entry) = entry else {
            return Ok(false);
        };

        match self
            .backend
            .undo_board(&self.app_id, &self.board_id, entry.clone())
            .await
        {
            Ok(()) => {
                log::debug!("Undid {} command(s) on board '{}'", entry.len(), self.board_id);
                self.history.lock().push_redo(&self.app_id, &self.board_id, entry);
                self.emit_history();
                self.refresh_after_commit().await;
                Ok(true)
            }
            Err(e) => {
                self.history.lock().push_undo(&self.app_id, &self.board_id, entry);
                self.notify_failure("Failed to undo", &e);
                Err(e)
            }
        }
    }

    /// Redo the last undone entry
    ///
    /// Returns false when there is nothing to redo. On failure the entry
    /// stays on the redo stack.
    pub async fn redo(&mut self) -> Result<bool> {
        self.ensure_writable()?;
        let entry = self.history.lock().pop_redo(&self.app_id, &self.board_id);
        let Some(entry) = entry else {
            return Ok(false);
        };

        match self
            .backend
            .redo_board(&self.app_id, &self.board_id, entry.clone())
            .await
        {
            Ok(()) => {
                log::debug!("Redid {} command(s) on board '{}'", entry.len(), self.board_id);
                self.history.lock().push_undo(&self.app_id, &self.board_id, entry);
                self.emit_history();
                self.refresh_after_commit().await;
                Ok(true)
            }
            Err(e) => {
                self.history.lock().push_redo(&self.app_id, &self.board_id, entry);
                self.notify_failure("Failed to redo", &e);
                Err(e)
            }
        }
    }

    /// Drop the history of this board, e.g. after it was deleted
    pub fn clear_history(&self) {
        self.history.lock().clear_board(&self.app_id, &self.board_id);
        self.emit_history();
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Connect two visible handles
    ///
    /// Returns false without contacting the backend when the connection is
    /// rejected by the validator.
    pub async fn connect(&mut self, source_handle: &str, target_handle: &str) -> Result<bool> {
        let resolved = match validate_connection(&self.projection.pin_cache, source_handle, target_handle) {
            Ok(resolved) => resolved,
            Err(rejection) => {
                log::debug!("Connection refused: {}", rejection);
                return Ok(false);
            }
        };
        let command = resolved.connect_command()?;
        self.execute_command(command.into(), false).await?;
        Ok(true)
    }

    /// Remove a visible edge; returns false for an unknown edge
    pub async fn disconnect(&mut self, edge_id: &str) -> Result<bool> {
        let Some(command) = self.disconnect_command(edge_id) else {
            log::debug!("Edge '{}' is not visible, nothing to disconnect", edge_id);
            return Ok(false);
        };
        self.execute_command(command.into(), false).await?;
        Ok(true)
    }

    fn disconnect_command(&self, edge_id: &str) -> Option<DisconnectPins> {
        let edge = self.projection.edge(edge_id)?;
        DisconnectPins::new(
            edge.source.clone(),
            edge.source_handle.clone(),
            edge.target.clone(),
            edge.target_handle.clone(),
        )
        .ok()
    }

    /// Move a node, layer or comment
    pub async fn move_entity(&mut self, id: &str, to: Coordinates) -> Result<Command> {
        let command: Command = match self.board.comments_in(self.current_layer()).and_then(|c| c.get(id)) {
            Some(comment) => {
                let mut comment = comment.clone();
                comment.coordinates = to;
                UpsertComment::new(comment, self.editor.current_layer.clone()).into()
            }
            None => MoveNode::new(id, to).into(),
        };
        self.execute_command(command, false).await
    }

    /// Commands deleting every selected entity and edge
    ///
    /// Edges are disconnected before their owners are removed. Ids that no
    /// longer resolve are skipped.
    fn delete_commands(&self) -> Vec<Command> {
        let mut selected: Vec<&String> = self.editor.selection.iter().collect();
        selected.sort();

        let mut disconnects: Vec<Command> = Vec::new();
        let mut removals: Vec<Command> = Vec::new();
        for id in selected {
            if let Some(command) = self.disconnect_command(id) {
                disconnects.push(command.into());
            } else if self.board.layers.contains_key(id.as_str()) {
                removals.push(RemoveLayer::new(id.clone()).into());
            } else if self.board.locate_node(id).is_some() {
                removals.push(RemoveNode::new(id.clone()).into());
            } else if self.board.locate_comment(id).is_some() {
                removals.push(RemoveComment::new(id.clone()).into());
            } else {
                log::debug!("Skipping unresolved selection '{}'", id);
            }
        }
        disconnects.extend(removals);
        disconnects
    }

    /// Delete the selection as a single batch
    pub async fn delete_selection(&mut self) -> Result<Vec<Command>> {
        let commands = self.delete_commands();
        let applied = self.execute_commands(commands, false).await?;
        if !applied.is_empty() {
            self.editor.clear_selection();
            self.reproject();
            self.emit_selection_changed();
        }
        Ok(applied)
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// The visible pin behind a handle, as the start of a drag
    pub fn dragged_pin(&self, handle: &str) -> Option<DraggedPin> {
        self.projection
            .pin_cache
            .get(handle)
            .map(|cached| DraggedPin::new(cached.owner_id.clone(), cached.pin.clone()))
    }

    /// Place a catalog node in the open layer
    ///
    /// When a pin is being dragged, the new node is wired to its first
    /// compatible pin in the same undo step. A node without a compatible pin
    /// is still placed, just unconnected.
    pub async fn place_node(
        &mut self,
        name: &str,
        position: Coordinates,
        dragged: Option<&DraggedPin>,
    ) -> Result<Node> {
        self.ensure_writable()?;
        if !self.catalog.contains(name) {
            self.load_catalog().await?;
        }
        let template = self
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| BoardError::NodeNotFound(name.to_string()))?;
        self.place_template(template, position, dragged).await
    }

    /// Place a template node, e.g. one dropped from a catalog panel
    pub async fn place_template(
        &mut self,
        mut template: Node,
        position: Coordinates,
        dragged: Option<&DraggedPin>,
    ) -> Result<Node> {
        template.coordinates = position;
        let command = AddNode::new(template, self.editor.current_layer.clone());
        let node = match self.execute_command(command.into(), false).await? {
            Command::AddNode(applied) => applied.node,
            other => {
                return Err(BoardError::backend(format!(
                    "expected AddNode, backend returned {}",
                    other.name()
                )))
            }
        };

        if let Some(dragged) = dragged {
            match matching_node_pin(&dragged.pin, &node, &self.board.refs) {
                Some(pin) => {
                    let connect = dragged.connect_to(&node.id, pin)?;
                    self.execute_command(connect.into(), true).await?;
                }
                None => log::debug!(
                    "No pin of '{}' accepts '{}', leaving it unconnected",
                    node.name,
                    dragged.pin.id
                ),
            }
        }
        Ok(node)
    }

    /// Place the node carried by a [`BoardEvent::CatalogDrop`]
    ///
    /// Other events are ignored and yield `None`, so a host can forward
    /// everything it receives from the editor bus.
    pub async fn handle_catalog_drop(&mut self, event: BoardEvent) -> Result<Option<Node>> {
        let BoardEvent::CatalogDrop { node, position } = event else {
            return Ok(None);
        };
        self.ensure_writable()?;
        let (x, y) = position;
        let placed = self.place_template(*node, (x, y, 0.0), None).await?;
        Ok(Some(placed))
    }

    /// Place an empty layer wired to the dragged pin
    pub async fn place_placeholder_layer(&mut self, dragged: &DraggedPin, position: Coordinates) -> Result<Layer> {
        self.ensure_writable()?;
        let layer = placeholder_layer(&dragged.pin, position);
        let command = UpsertLayer::new(layer, self.editor.current_layer.clone());
        let layer = match self.execute_command(command.into(), false).await? {
            Command::UpsertLayer(applied) => applied.layer,
            other => {
                return Err(BoardError::backend(format!(
                    "expected UpsertLayer, backend returned {}",
                    other.name()
                )))
            }
        };

        if let Some(pin) = matching_layer_pin(&dragged.pin, &layer, &self.board.refs) {
            let connect = dragged.connect_to(&layer.id, pin)?;
            self.execute_command(connect.into(), true).await?;
        }
        Ok(layer)
    }

    // ========================================================================
    // Navigation and selection
    // ========================================================================

    /// Open a layer nested in the current scope
    pub fn push_layer(&mut self, layer_id: &str) -> Result<()> {
        let in_scope = self
            .board
            .layers
            .get(layer_id)
            .is_some_and(|layer| layer.parent_id == self.editor.current_layer);
        if !in_scope {
            return Err(BoardError::LayerNotFound(layer_id.to_string()));
        }
        self.editor.push_layer(layer_id);
        self.reproject();
        self.emit_layer_changed();
        Ok(())
    }

    /// Return to the parent scope; false when already at the root
    pub fn pop_layer(&mut self) -> bool {
        if !self.editor.pop_layer() {
            return false;
        }
        self.reproject();
        self.emit_layer_changed();
        true
    }

    /// Jump to a layer path such as `"L1/L2"`; `None` opens the root
    pub fn set_layer_path(&mut self, path: Option<&str>) {
        self.editor.set_layer_path(path);
        self.editor.reconcile(&self.board);
        self.reproject();
        self.emit_layer_changed();
    }

    /// Replace the selection
    pub fn select<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.editor.select(ids);
        self.reproject();
        self.emit_selection_changed();
    }

    pub fn clear_selection(&mut self) {
        self.editor.clear_selection();
        self.reproject();
        self.emit_selection_changed();
    }

    pub fn selection(&self) -> &HashSet<String> {
        &self.editor.selection
    }

    /// Open layers from the outermost in, with their names
    pub fn breadcrumbs(&self) -> Vec<(LayerId, String)> {
        self.editor
            .layer_stack()
            .into_iter()
            .map(|id| {
                let name = self
                    .board
                    .layers
                    .get(id)
                    .map(|layer| layer.name.clone())
                    .unwrap_or_default();
                (id.to_string(), name)
            })
            .collect()
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    fn viewport_key(&self) -> String {
        viewport_key(&self.app_id, &self.board_id, self.editor.layer_path.as_deref())
    }

    /// Remember the view of the open layer
    pub fn save_viewport(&self, x: f32, y: f32, zoom: f32) -> Result<Viewport> {
        self.viewports.save(&self.viewport_key(), x, y, zoom)
    }

    /// The stored view of the open layer, or one that fits its content
    pub fn restore_viewport(&self) -> Viewport {
        self.viewports
            .get(&self.viewport_key())
            .unwrap_or_else(|| fit_view(&self.projection, &self.config))
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Run the board from an entry node, tracking it in the run registry
    pub async fn run_board(
        &mut self,
        node_id: &str,
        payload: Option<serde_json::Value>,
        stream: bool,
    ) -> Result<RunMetadata> {
        let mut request = RunRequest::new(node_id);
        request.payload = payload;
        let observer = SessionRunObserver {
            app_id: self.app_id.clone(),
            board_id: self.board_id.clone(),
            runs: self.runs.clone(),
            event_sink: self.event_sink.clone(),
        };

        match self
            .backend
            .execute_board(&self.app_id, &self.board_id, request, stream, &observer)
            .await
        {
            Ok(metadata) => {
                log::info!("Run '{}' of board '{}' finished", metadata.run_id, self.board_id);
                self.runs.finish(metadata.clone());
                let _ = self.event_sink.send(BoardEvent::RunFinished {
                    board_id: self.board_id.clone(),
                    run_id: metadata.run_id.clone(),
                    status: metadata.status,
                });
                Ok(metadata)
            }
            Err(e) => {
                self.notify_failure("Failed to run board", &e);
                Err(e)
            }
        }
    }
}

/// Feeds run callbacks into the registry and the event sink
struct SessionRunObserver {
    app_id: String,
    board_id: String,
    runs: SharedRunRegistry,
    event_sink: Arc<dyn EventSink>,
}

impl RunObserver for SessionRunObserver {
    fn on_start(&self, run_id: &str) {
        self.runs.start(run_id, &self.app_id, &self.board_id);
        let _ = self.event_sink.send(BoardEvent::RunStarted {
            board_id: self.board_id.clone(),
            run_id: run_id.to_string(),
        });
    }

    fn on_update(&self, update: &RunUpdate) {
        self.runs.record(update);
        let _ = self.event_sink.send(BoardEvent::RunProgress {
            board_id: self.board_id.clone(),
            update: update.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BoardBuilder, NodeBuilder};
    use crate::commands::ConnectPins;
    use crate::events::VecEventSink;
    use crate::memory::MemoryBackend;
    use crate::pin::{DataType, PinType};
    use crate::projection::edge_id;
    use crate::runs::RunStatus;
    use crate::types::VersionBump;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Memory backend that counts calls and can be switched offline
    #[derive(Default)]
    struct RecordingBackend {
        inner: MemoryBackend,
        fetches: AtomicUsize,
        mutations: AtomicUsize,
        offline: AtomicBool,
    }

    impl RecordingBackend {
        fn mutation(&self) -> Result<()> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(BoardError::backend("connection refused"));
            }
            Ok(())
        }

        fn mutations(&self) -> usize {
            self.mutations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BoardBackend for RecordingBackend {
        async fn get_catalog(&self) -> Result<Vec<Node>> {
            self.inner.get_catalog().await
        }

        async fn get_board(&self, app_id: &str, board_id: &str, version: Option<Version>) -> Result<Board> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.get_board(app_id, board_id, version).await
        }

        async fn execute_command(&self, app_id: &str, board_id: &str, command: Command) -> Result<Command> {
            self.mutation()?;
            self.inner.execute_command(app_id, board_id, command).await
        }

        async fn execute_commands(
            &self,
            app_id: &str,
            board_id: &str,
            commands: Vec<Command>,
        ) -> Result<Vec<Command>> {
            self.mutation()?;
            self.inner.execute_commands(app_id, board_id, commands).await
        }

        async fn undo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> Result<()> {
            self.mutation()?;
            self.inner.undo_board(app_id, board_id, commands).await
        }

        async fn redo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> Result<()> {
            self.mutation()?;
            self.inner.redo_board(app_id, board_id, commands).await
        }

        async fn execute_board(
            &self,
            app_id: &str,
            board_id: &str,
            request: RunRequest,
            stream: bool,
            observer: &dyn RunObserver,
        ) -> Result<RunMetadata> {
            self.inner
                .execute_board(app_id, board_id, request, stream, observer)
                .await
        }
    }

    fn control_branch() -> Node {
        NodeBuilder::new("tpl-branch", "control_branch")
            .friendly_name("Branch")
            .category("Control")
            .output("true", DataType::Boolean)
            .output("false", DataType::Boolean)
            .input("exec_in", DataType::Execution)
            .build()
    }

    fn log_info() -> Node {
        NodeBuilder::new("tpl-log", "log_info")
            .friendly_name("Log Info")
            .input("exec", DataType::Execution)
            .input("message", DataType::String)
            .build()
    }

    fn initial_board() -> Board {
        let mut layer = Layer::new("L1", "Inner");
        layer
            .nodes
            .insert("N1".into(), NodeBuilder::new("N1", "log_info").build());
        BoardBuilder::new("b", "Board")
            .add_node(
                NodeBuilder::new("start", "events_simple")
                    .start()
                    .output("exec", DataType::Execution)
                    .build(),
            )
            .add_node(
                NodeBuilder::new("a", "constant")
                    .output("out", DataType::Integer)
                    .build(),
            )
            .add_node(NodeBuilder::new("sink", "add").input("in", DataType::Integer).build())
            .add_layer(layer)
            .build()
    }

    fn backend() -> Arc<RecordingBackend> {
        let backend = RecordingBackend::default();
        backend.inner.insert_board("app", initial_board());
        backend.inner.register_template(control_branch());
        backend.inner.register_template(log_info());
        Arc::new(backend)
    }

    async fn open(backend: &Arc<RecordingBackend>) -> (BoardSession, Arc<VecEventSink>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let events = Arc::new(VecEventSink::new());
        let session = BoardSession::open(backend.clone(), "app", "b", SessionConfig::default())
            .await
            .unwrap()
            .with_event_sink(events.clone());
        (session, events)
    }

    fn notifications(events: &VecEventSink, wanted: NotificationLevel) -> Vec<String> {
        events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BoardEvent::Notification { level, message } if level == wanted => Some(message),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_read_only_version_never_reaches_backend() {
        let backend = backend();
        let version = backend
            .inner
            .create_version("app", "b", VersionBump::Minor)
            .unwrap();
        let events = Arc::new(VecEventSink::new());
        let mut session =
            BoardSession::open_at(backend.clone(), "app", "b", Some(version), SessionConfig::default())
                .await
                .unwrap()
                .with_event_sink(events.clone());
        assert!(session.is_read_only());

        let err = session
            .execute_command(MoveNode::new("a", (1.0, 1.0, 0.0)).into(), false)
            .await
            .unwrap_err();
        assert!(err.is_read_only());
        let err = session.execute_commands(Vec::new(), false).await.unwrap_err();
        assert!(err.is_read_only());
        assert!(session.place_node("log_info", (0.0, 0.0, 0.0), None).await.is_err());

        assert_eq!(backend.mutations(), 0);
        assert_eq!(notifications(&events, NotificationLevel::Warning).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        let fetches = backend.fetches.load(Ordering::SeqCst);

        let applied = session.execute_commands(Vec::new(), false).await.unwrap();
        assert!(applied.is_empty());
        assert_eq!(backend.mutations(), 0);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), fetches);
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_undo_redo_round_trip() {
        let backend = backend();
        let (mut session, events) = open(&backend).await;
        let initial = session.board().clone();

        let commands: Vec<Command> = vec![
            AddNode::concrete(
                NodeBuilder::new("extra", "add").input("in", DataType::Integer).build(),
                None,
            )
            .into(),
            ConnectPins::new("a", "a/out", "sink", "sink/in").unwrap().into(),
            MoveNode::new("sink", (50.0, 25.0, 0.0)).into(),
            ConnectPins::new("a", "a/out", "extra", "extra/in").unwrap().into(),
        ];
        for command in commands {
            session.execute_command(command, false).await.unwrap();
        }
        let after = session.board().clone();
        assert_ne!(after, initial);

        for _ in 0..4 {
            assert!(session.undo().await.unwrap());
        }
        assert!(!session.undo().await.unwrap());
        assert_eq!(session.board(), &initial);
        assert_eq!(backend.inner.board("app", "b").unwrap(), initial);

        for _ in 0..4 {
            assert!(session.redo().await.unwrap());
        }
        assert!(!session.redo().await.unwrap());
        assert_eq!(session.board(), &after);

        let last_history = events.events().into_iter().rev().find_map(|event| match event {
            BoardEvent::HistoryChanged { can_undo, can_redo, .. } => Some((can_undo, can_redo)),
            _ => None,
        });
        assert_eq!(last_history, Some((true, false)));
    }

    #[tokio::test]
    async fn test_new_edit_clears_redo() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        session
            .execute_command(MoveNode::new("a", (1.0, 0.0, 0.0)).into(), false)
            .await
            .unwrap();
        session.undo().await.unwrap();
        assert!(session.can_redo());

        session
            .execute_command(MoveNode::new("a", (2.0, 0.0, 0.0)).into(), false)
            .await
            .unwrap();
        assert!(!session.can_redo());
    }

    #[tokio::test]
    async fn test_backend_failure_notifies_and_keeps_state() {
        let backend = backend();
        let (mut session, events) = open(&backend).await;
        let before = session.board().clone();

        backend.offline.store(true, Ordering::SeqCst);
        let result = session
            .execute_command(MoveNode::new("a", (9.0, 9.0, 0.0)).into(), false)
            .await;
        assert!(matches!(result, Err(BoardError::Backend(_))));
        assert_eq!(session.board(), &before);
        assert!(!session.can_undo());

        let errors = notifications(&events, NotificationLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("MoveNode"));
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_entry() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        session
            .execute_command(MoveNode::new("a", (3.0, 0.0, 0.0)).into(), false)
            .await
            .unwrap();

        backend.offline.store(true, Ordering::SeqCst);
        assert!(session.undo().await.is_err());
        assert!(session.can_undo());
        assert!(!session.can_redo());

        backend.offline.store(false, Ordering::SeqCst);
        assert!(session.undo().await.unwrap());
        assert_eq!(session.board().find_node("a").unwrap().coordinates, (0.0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn test_node_placed_in_open_layer() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        session.push_layer("L1").unwrap();
        let node = session
            .place_node("log_info", (10.0, 10.0, 0.0), None)
            .await
            .unwrap();

        let board = session.board();
        assert!(board.layers["L1"].nodes.contains_key(&node.id));
        assert!(!board.nodes.contains_key(&node.id));
        assert!(session.projection().node(&node.id).is_some());

        session.set_layer_path(None);
        assert!(session.projection().node(&node.id).is_none());
        assert!(session.projection().node("L1").is_some());
    }

    #[tokio::test]
    async fn test_push_layer_outside_scope_is_rejected() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        assert!(matches!(
            session.push_layer("missing"),
            Err(BoardError::LayerNotFound(_))
        ));
        assert_eq!(session.current_layer(), None);
    }

    #[tokio::test]
    async fn test_pop_layer_returns_to_root() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        session.set_layer_path(Some("L1"));
        assert_eq!(session.current_layer(), Some("L1"));
        assert!(session.projection().node("N1").is_some());
        assert_eq!(session.breadcrumbs(), vec![("L1".to_string(), "Inner".to_string())]);

        assert!(session.pop_layer());
        assert_eq!(session.layer_path(), None);
        assert_eq!(session.current_layer(), None);
        assert!(session.projection().node("N1").is_none());
        assert!(session.projection().node("start").is_some());
        assert!(!session.pop_layer());
    }

    #[tokio::test]
    async fn test_drag_from_execution_output_wires_branch_input() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        let dragged = session.dragged_pin("start/exec").unwrap();
        let node = session
            .place_node("control_branch", (200.0, 0.0, 0.0), Some(&dragged))
            .await
            .unwrap();

        let exec_in = node.pin_by_name("exec_in").unwrap();
        let start_exec = session.board().find_pin("start/exec").unwrap();
        assert_eq!(
            start_exec.connected_to.iter().collect::<Vec<_>>(),
            vec![&exec_in.id]
        );
        for name in ["true", "false"] {
            let pin = session.board().find_pin(&node.pin_by_name(name).unwrap().id).unwrap();
            assert!(!pin.is_connected());
        }
        assert!(session.projection().edge(&edge_id("start/exec", &exec_in.id)).is_some());

        // Placement and wiring undo together
        assert_eq!(session.history().lock().undo_len("app", "b"), 1);
        session.undo().await.unwrap();
        assert!(session.board().find_node(&node.id).is_none());
        assert!(!session.board().find_pin("start/exec").unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_placement_without_match_leaves_node_unconnected() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        let dragged = session.dragged_pin("a/out").unwrap();
        let node = session
            .place_node("control_branch", (0.0, 0.0, 0.0), Some(&dragged))
            .await
            .unwrap();
        assert!(session.board().find_node(&node.id).is_some());
        assert!(!session.board().find_pin("a/out").unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_placeholder_layer_is_wired() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        let dragged = session.dragged_pin("a/out").unwrap();
        let layer = session
            .place_placeholder_layer(&dragged, (300.0, 0.0, 0.0))
            .await
            .unwrap();

        let stored = &session.board().layers[&layer.id];
        assert_eq!(stored.parent_id, None);
        let boundary = stored.ordered_pins()[0];
        assert_eq!(boundary.pin_type, PinType::Input);
        assert!(boundary.depends_on.contains("a/out"));
        assert_eq!(session.history().lock().undo_len("app", "b"), 1);
    }

    #[tokio::test]
    async fn test_placeholder_layer_is_wired_from_inside() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        let dragged = session.dragged_pin("start/exec").unwrap();
        let layer = session
            .place_placeholder_layer(&dragged, (300.0, 0.0, 0.0))
            .await
            .unwrap();
        let boundary_id = layer.ordered_pins()[0].id.clone();

        session.push_layer(&layer.id).unwrap();
        let inner = session.dragged_pin(&boundary_id).unwrap();
        assert_eq!(inner.owner_id, layer.id);
        assert_eq!(inner.pin.pin_type, PinType::Output);

        let node = session
            .place_node("log_info", (0.0, 0.0, 0.0), Some(&inner))
            .await
            .unwrap();
        let exec = node.pin_by_name("exec").unwrap();
        let stored = session.board().find_pin(&boundary_id).unwrap();
        assert!(stored.depends_on.contains("start/exec"));
        assert!(stored.connected_to.contains(&exec.id));
        assert!(session
            .projection()
            .edge(&edge_id(&boundary_id, &exec.id))
            .is_some());

        // Execution passes through the layer boundary
        let metadata = session.run_board("start", None, false).await.unwrap();
        assert_eq!(metadata.log_count, 2);
    }

    #[tokio::test]
    async fn test_catalog_drop_from_bus_places_node() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        session.push_layer("L1").unwrap();

        let bus = crate::events::EditorBus::new();
        let mut rx = bus.subscribe();
        bus.send(BoardEvent::CatalogDrop {
            node: Box::new(log_info()),
            position: (40.0, 60.0),
        })
        .unwrap();
        bus.send(BoardEvent::error("unrelated")).unwrap();

        let dropped = rx.recv().await.unwrap();
        let node = session.handle_catalog_drop(dropped).await.unwrap().unwrap();
        assert_eq!(node.coordinates, (40.0, 60.0, 0.0));
        assert!(session.board().layers["L1"].nodes.contains_key(&node.id));
        assert!(session.projection().node(&node.id).is_some());

        let other = rx.recv().await.unwrap();
        assert!(session.handle_catalog_drop(other).await.unwrap().is_none());
        assert_eq!(session.history().lock().undo_len("app", "b"), 1);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;

        // Direction does not matter, type does
        assert!(!session.connect("a/out", "start/exec").await.unwrap());
        assert!(!session.connect("a/out", "missing").await.unwrap());
        assert_eq!(backend.mutations(), 0);

        assert!(session.connect("sink/in", "a/out").await.unwrap());
        let id = edge_id("a/out", "sink/in");
        assert!(session.projection().edge(&id).is_some());

        assert!(session.disconnect(&id).await.unwrap());
        assert!(session.projection().edge(&id).is_none());
        assert!(!session.disconnect(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_selection_is_one_batch() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        session.connect("a/out", "sink/in").await.unwrap();
        let before = session.board().clone();
        let mutations = backend.mutations();

        session.select([edge_id("a/out", "sink/in"), "start".to_string(), "L1".to_string()]);
        let applied = session.delete_selection().await.unwrap();
        assert_eq!(applied.len(), 3);
        assert_eq!(backend.mutations(), mutations + 1);
        assert!(session.selection().is_empty());

        let board = session.board();
        assert!(board.find_node("start").is_none());
        assert!(!board.layers.contains_key("L1"));
        assert!(!board.find_pin("a/out").unwrap().is_connected());

        session.undo().await.unwrap();
        assert_eq!(session.board(), &before);
    }

    #[tokio::test]
    async fn test_move_comment() {
        let backend = backend();
        let (mut session, _) = open(&backend).await;
        session
            .execute_command(
                UpsertComment::new(crate::types::Comment::new("c1", "note", (0.0, 0.0, 0.0)), None).into(),
                false,
            )
            .await
            .unwrap();

        session.move_entity("c1", (7.0, 8.0, 0.0)).await.unwrap();
        assert_eq!(session.board().comments["c1"].coordinates, (7.0, 8.0, 0.0));
        assert_eq!(session.board().comments["c1"].content, "note");

        session.undo().await.unwrap();
        assert_eq!(session.board().comments["c1"].coordinates, (0.0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn test_deleted_layer_closes_on_refresh() {
        let backend = backend();
        let (mut session, events) = open(&backend).await;
        session.set_layer_path(Some("L1"));
        events.clear();

        backend
            .inner
            .execute_command("app", "b", RemoveLayer::new("L1").into())
            .await
            .unwrap();
        session.refresh().await.unwrap();

        assert_eq!(session.current_layer(), None);
        assert!(events
            .events()
            .iter()
            .any(|event| matches!(event, BoardEvent::LayerChanged { current_layer: None, .. })));
    }

    #[tokio::test]
    async fn test_viewport_per_layer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("viewports.json");
        let backend = backend();
        let config = SessionConfig::default().with_viewport_store(&path);

        {
            let mut session = BoardSession::open(backend.clone(), "app", "b", config.clone())
                .await
                .unwrap();
            session.save_viewport(10.0, 20.0, 1.5).unwrap();
            session.push_layer("L1").unwrap();
            // Nothing stored for the layer yet, fit its content instead
            let fitted = session.restore_viewport();
            let expected = fit_view(session.projection(), &config);
            assert_eq!((fitted.x, fitted.y, fitted.zoom), (expected.x, expected.y, expected.zoom));
        }

        let session = BoardSession::open(backend, "app", "b", config).await.unwrap();
        let restored = session.restore_viewport();
        assert_eq!((restored.x, restored.y, restored.zoom), (10.0, 20.0, 1.5));
    }

    #[tokio::test]
    async fn test_run_board_tracks_progress() {
        let backend = backend();
        let (mut session, events) = open(&backend).await;

        let metadata = session.run_board("start", None, true).await.unwrap();
        assert_eq!(metadata.status, RunStatus::Success);

        let run = session.runs().get(&metadata.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.logs.len(), metadata.log_count);
        assert!(run.metadata.is_some());

        let events = events.events();
        assert!(events.iter().any(|e| matches!(e, BoardEvent::RunStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, BoardEvent::RunProgress { .. })));
        assert!(matches!(
            events.last(),
            Some(BoardEvent::RunFinished { status: RunStatus::Success, .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_inverted_zoom_range() {
        let backend = backend();
        let config: SessionConfig =
            serde_json::from_str(r#"{"min_zoom": 3.0, "max_zoom": 2.0}"#).unwrap();
        let result = BoardSession::open(backend.clone(), "app", "b", config).await;
        assert!(matches!(result, Err(BoardError::InvalidConfig(_))));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_unknown_node_notifies() {
        let backend = backend();
        let (mut session, events) = open(&backend).await;
        assert!(session.run_board("missing", None, false).await.is_err());
        assert_eq!(notifications(&events, NotificationLevel::Error).len(), 1);
        assert!(session.runs().is_empty());
    }
}
