//! Undo/redo history of applied commands
//!
//! History is kept per (app, board) pair so operations on different boards
//! never interleave. Each entry is the batch of applied commands returned by
//! one execution; undoing an entry sends that batch back for inversion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::commands::Command;
use crate::config::defaults;

/// One undoable step
pub type HistoryEntry = Vec<Command>;

#[derive(Debug, Default)]
struct BoardHistory {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

/// Undo and redo stacks for every open board
#[derive(Debug)]
pub struct CommandHistory {
    boards: HashMap<(String, String), BoardHistory>,
    /// Maximum undo entries kept per board
    max_entries: usize,
}

/// History shared between the sessions of one editor
pub type SharedHistory = Arc<Mutex<CommandHistory>>;

fn key(app_id: &str, board_id: &str) -> (String, String) {
    (app_id.to_string(), board_id.to_string())
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            boards: HashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn shared(max_entries: usize) -> SharedHistory {
        Arc::new(Mutex::new(Self::new(max_entries)))
    }

    /// Record a successful execution
    ///
    /// A normal push clears the redo stack. An append continuation extends
    /// the top entry instead, so the whole interaction undoes in one step,
    /// and leaves the redo stack alone.
    pub fn push(&mut self, app_id: &str, board_id: &str, entry: HistoryEntry, append: bool) {
        if entry.is_empty() {
            return;
        }
        let history = self.boards.entry(key(app_id, board_id)).or_default();
        if append {
            if let Some(top) = history.undo.back_mut() {
                top.extend(entry);
                return;
            }
        } else {
            history.redo.clear();
        }

        history.undo.push_back(entry);
        while history.undo.len() > self.max_entries {
            history.undo.pop_front();
        }
        log::debug!(
            "History for {}/{}: {} undo, {} redo",
            app_id,
            board_id,
            history.undo.len(),
            history.redo.len()
        );
    }

    pub fn pop_undo(&mut self, app_id: &str, board_id: &str) -> Option<HistoryEntry> {
        self.boards.get_mut(&key(app_id, board_id))?.undo.pop_back()
    }

    pub fn pop_redo(&mut self, app_id: &str, board_id: &str) -> Option<HistoryEntry> {
        self.boards.get_mut(&key(app_id, board_id))?.redo.pop()
    }

    /// Put an undone entry on the redo stack
    pub fn push_redo(&mut self, app_id: &str, board_id: &str, entry: HistoryEntry) {
        self.boards
            .entry(key(app_id, board_id))
            .or_default()
            .redo
            .push(entry);
    }

    /// Put a redone entry back on the undo stack, keeping the redo stack
    pub fn push_undo(&mut self, app_id: &str, board_id: &str, entry: HistoryEntry) {
        let history = self.boards.entry(key(app_id, board_id)).or_default();
        history.undo.push_back(entry);
        while history.undo.len() > self.max_entries {
            history.undo.pop_front();
        }
    }

    pub fn can_undo(&self, app_id: &str, board_id: &str) -> bool {
        self.undo_len(app_id, board_id) > 0
    }

    pub fn can_redo(&self, app_id: &str, board_id: &str) -> bool {
        self.redo_len(app_id, board_id) > 0
    }

    pub fn undo_len(&self, app_id: &str, board_id: &str) -> usize {
        self.boards
            .get(&key(app_id, board_id))
            .map_or(0, |h| h.undo.len())
    }

    pub fn redo_len(&self, app_id: &str, board_id: &str) -> usize {
        self.boards
            .get(&key(app_id, board_id))
            .map_or(0, |h| h.redo.len())
    }

    /// Forget a deleted board
    pub fn clear_board(&mut self, app_id: &str, board_id: &str) {
        self.boards.remove(&key(app_id, board_id));
    }

    /// Forget every board of an app
    pub fn clear_app(&mut self, app_id: &str) {
        self.boards.retain(|(app, _), _| app != app_id);
    }

    /// Keep only the boards of the given app, for an app context switch
    pub fn retain_app(&mut self, app_id: &str) {
        self.boards.retain(|(app, _), _| app == app_id);
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(defaults::HISTORY_LIMIT)
    }
}
