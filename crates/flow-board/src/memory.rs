//! In-memory backend
//!
//! Keeps boards in memory and applies commands locally, with immutable
//! version snapshots and a dry-run executor. Suitable for tests, offline
//! editing and as the reference for remote implementations.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::backend::{BoardBackend, RunObserver};
use crate::catalog::Catalog;
use crate::commands::{apply_all, revert_all, Command};
use crate::error::{BoardError, Result};
use crate::pin::PinType;
use crate::runs::{LogLevel, RunLog, RunMetadata, RunRequest, RunStatus, RunUpdate};
use crate::types::{new_id, Board, Node, Version, VersionBump};

#[derive(Debug, Clone)]
struct StoredBoard {
    board: Board,
    versions: BTreeMap<Version, Board>,
}

/// Backend that stores boards in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    boards: RwLock<HashMap<(String, String), StoredBoard>>,
    catalog: RwLock<Catalog>,
}

fn key(app_id: &str, board_id: &str) -> (String, String) {
    (app_id.to_string(), board_id.to_string())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            catalog: RwLock::new(catalog),
        }
    }

    /// Store a board, replacing any board with the same id
    pub fn insert_board(&self, app_id: &str, board: Board) {
        log::info!("Stored board '{}' for app '{}'", board.id, app_id);
        self.boards.write().insert(
            key(app_id, &board.id),
            StoredBoard {
                board,
                versions: BTreeMap::new(),
            },
        );
    }

    /// Current state of a board
    pub fn board(&self, app_id: &str, board_id: &str) -> Option<Board> {
        self.boards
            .read()
            .get(&key(app_id, board_id))
            .map(|stored| stored.board.clone())
    }

    pub fn remove_board(&self, app_id: &str, board_id: &str) -> Option<Board> {
        self.boards
            .write()
            .remove(&key(app_id, board_id))
            .map(|stored| stored.board)
    }

    pub fn register_template(&self, template: Node) {
        self.catalog.write().register(template);
    }

    /// Freeze the current state as a new version
    ///
    /// The snapshot keeps the bumped version and the live board continues
    /// from it.
    pub fn create_version(&self, app_id: &str, board_id: &str, bump: VersionBump) -> Result<Version> {
        let mut boards = self.boards.write();
        let stored = boards
            .get_mut(&key(app_id, board_id))
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))?;
        let version = stored.board.version.bump(bump);
        stored.board.version = version;
        stored.versions.insert(version, stored.board.clone());
        log::info!("Created version {} of board '{}'", version, board_id);
        Ok(version)
    }

    /// Saved versions of a board, oldest first
    pub fn versions(&self, app_id: &str, board_id: &str) -> Vec<Version> {
        self.boards
            .read()
            .get(&key(app_id, board_id))
            .map(|stored| stored.versions.keys().copied().collect())
            .unwrap_or_default()
    }

    fn with_board<T>(
        &self,
        app_id: &str,
        board_id: &str,
        f: impl FnOnce(&mut Board) -> Result<T>,
    ) -> Result<T> {
        let mut boards = self.boards.write();
        let stored = boards
            .get_mut(&key(app_id, board_id))
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))?;
        f(&mut stored.board)
    }
}

/// Walk execution edges breadth-first from the entry node
///
/// Boundary pins of layers are passed through to whatever they feed.
fn execution_order(board: &Board, start: &str) -> Vec<String> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for node in board
        .nodes
        .values()
        .chain(board.layers.values().flat_map(|l| l.nodes.values()))
    {
        for pin_id in node.pins.keys() {
            owners.insert(pin_id.as_str(), node.id.as_str());
        }
    }

    let mut order = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_pins: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(node_id) = queue.pop_front() {
        if !visited.insert(node_id.clone()) {
            continue;
        }
        let Some(node) = board.find_node(&node_id) else {
            continue;
        };
        order.push(node_id);

        let mut pending: VecDeque<&str> = node
            .ordered_pins()
            .into_iter()
            .filter(|pin| pin.pin_type == PinType::Output && pin.is_execution())
            .flat_map(|pin| pin.connected_to.iter().map(String::as_str))
            .collect();
        while let Some(pin_id) = pending.pop_front() {
            if !seen_pins.insert(pin_id.to_string()) {
                continue;
            }
            if let Some(owner) = owners.get(pin_id) {
                queue.push_back(owner.to_string());
            } else if let Some(boundary) = board.find_pin(pin_id) {
                pending.extend(boundary.connected_to.iter().map(String::as_str));
            }
        }
    }
    order
}

#[async_trait]
impl BoardBackend for MemoryBackend {
    async fn get_catalog(&self) -> Result<Vec<Node>> {
        Ok(self.catalog.read().list().into_iter().cloned().collect())
    }

    async fn get_board(&self, app_id: &str, board_id: &str, version: Option<Version>) -> Result<Board> {
        let boards = self.boards.read();
        let stored = boards
            .get(&key(app_id, board_id))
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))?;
        match version {
            None => Ok(stored.board.clone()),
            Some(version) => stored.versions.get(&version).cloned().ok_or_else(|| {
                BoardError::BoardNotFound(format!("{} at version {}", board_id, version))
            }),
        }
    }

    async fn execute_command(&self, app_id: &str, board_id: &str, command: Command) -> Result<Command> {
        let mut applied = self.execute_commands(app_id, board_id, vec![command]).await?;
        applied
            .pop()
            .ok_or_else(|| BoardError::backend("no applied command returned"))
    }

    async fn execute_commands(
        &self,
        app_id: &str,
        board_id: &str,
        mut commands: Vec<Command>,
    ) -> Result<Vec<Command>> {
        self.with_board(app_id, board_id, |board| apply_all(board, &mut commands))?;
        log::debug!("Applied {} command(s) to board '{}'", commands.len(), board_id);
        Ok(commands)
    }

    async fn undo_board(&self, app_id: &str, board_id: &str, mut commands: Vec<Command>) -> Result<()> {
        self.with_board(app_id, board_id, |board| revert_all(board, &mut commands))
    }

    async fn redo_board(&self, app_id: &str, board_id: &str, mut commands: Vec<Command>) -> Result<()> {
        self.with_board(app_id, board_id, |board| apply_all(board, &mut commands))
    }

    async fn execute_board(
        &self,
        app_id: &str,
        board_id: &str,
        request: RunRequest,
        stream: bool,
        observer: &dyn RunObserver,
    ) -> Result<RunMetadata> {
        let board = self.get_board(app_id, board_id, None).await?;
        if board.find_node(&request.node_id).is_none() {
            return Err(BoardError::NodeNotFound(request.node_id));
        }

        let run_id = new_id();
        let started_at = Utc::now();
        observer.on_start(&run_id);
        if stream {
            observer.on_update(&RunUpdate::Started {
                run_id: run_id.clone(),
            });
        }

        let order = execution_order(&board, &request.node_id);
        for node_id in &order {
            let label = board
                .find_node(node_id)
                .map(|n| n.friendly_name.clone())
                .unwrap_or_default();
            let entry = RunLog::new(node_id.clone(), LogLevel::Info, format!("Executed {}", label));
            if stream {
                observer.on_update(&RunUpdate::Log {
                    run_id: run_id.clone(),
                    log: entry,
                });
            }
        }
        if stream {
            observer.on_update(&RunUpdate::Finished {
                run_id: run_id.clone(),
                status: RunStatus::Success,
            });
        }

        log::info!(
            "Run '{}' of board '{}' visited {} node(s)",
            run_id,
            board_id,
            order.len()
        );
        Ok(RunMetadata {
            run_id,
            app_id: app_id.to_string(),
            board_id: board_id.to_string(),
            node_id: request.node_id,
            version: board.version,
            status: RunStatus::Success,
            started_at,
            ended_at: Some(Utc::now()),
            log_count: order.len(),
        })
    }
}
