//! Board runs
//!
//! A run is one execution of a board from an entry node. Its metadata and
//! the log events streamed while it executes are kept in a [`RunRegistry`]
//! keyed by run id. Runs can be observed and dropped from the registry but
//! not aborted from here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Version;

/// Request to run a board from an entry node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub node_id: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl RunRequest {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// One log event emitted by a node during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub node_id: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RunLog {
    pub fn new(node_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Summary of a run, returned once it completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub app_id: String,
    pub board_id: String,
    pub node_id: String,
    pub version: Version,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log_count: usize,
}

/// Streamed progress of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "update_type")]
pub enum RunUpdate {
    Started { run_id: String },
    Log { run_id: String, log: RunLog },
    Finished { run_id: String, status: RunStatus },
}

impl RunUpdate {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Started { run_id } | Self::Log { run_id, .. } | Self::Finished { run_id, .. } => {
                run_id
            }
        }
    }
}

/// A run tracked by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRun {
    pub run_id: String,
    pub app_id: String,
    pub board_id: String,
    pub status: RunStatus,
    pub logs: Vec<RunLog>,
    /// Set once the backend returns the final metadata
    pub metadata: Option<RunMetadata>,
}

/// Run-id keyed store of runs and their streamed logs
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, TrackedRun>>,
}

/// Registry shared between sessions
pub type SharedRunRegistry = Arc<RunRegistry>;

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a run
    pub fn start(&self, run_id: &str, app_id: &str, board_id: &str) {
        log::debug!("Tracking run '{}' of board '{}'", run_id, board_id);
        self.runs.write().insert(
            run_id.to_string(),
            TrackedRun {
                run_id: run_id.to_string(),
                app_id: app_id.to_string(),
                board_id: board_id.to_string(),
                status: RunStatus::Running,
                logs: Vec::new(),
                metadata: None,
            },
        );
    }

    /// Apply a streamed update; updates for unknown runs are ignored
    pub fn record(&self, update: &RunUpdate) {
        let mut runs = self.runs.write();
        let Some(run) = runs.get_mut(update.run_id()) else {
            log::debug!("Ignoring update for untracked run '{}'", update.run_id());
            return;
        };
        match update {
            RunUpdate::Started { .. } => run.status = RunStatus::Running,
            RunUpdate::Log { log, .. } => run.logs.push(log.clone()),
            RunUpdate::Finished { status, .. } => run.status = *status,
        }
    }

    /// Store the final metadata of a run, tracking it if it was not yet
    pub fn finish(&self, metadata: RunMetadata) {
        let mut runs = self.runs.write();
        let run = runs
            .entry(metadata.run_id.clone())
            .or_insert_with(|| TrackedRun {
                run_id: metadata.run_id.clone(),
                app_id: metadata.app_id.clone(),
                board_id: metadata.board_id.clone(),
                status: metadata.status,
                logs: Vec::new(),
                metadata: None,
            });
        run.status = metadata.status;
        run.metadata = Some(metadata);
    }

    pub fn get(&self, run_id: &str) -> Option<TrackedRun> {
        self.runs.read().get(run_id).cloned()
    }

    /// Runs of a board, oldest first
    pub fn list(&self, app_id: &str, board_id: &str) -> Vec<TrackedRun> {
        let mut runs: Vec<TrackedRun> = self
            .runs
            .read()
            .values()
            .filter(|r| r.app_id == app_id && r.board_id == board_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| {
            (
                r.metadata.as_ref().map(|m| m.started_at),
                r.run_id.clone(),
            )
        });
        runs
    }

    /// Stop tracking a run; the run itself keeps going
    pub fn remove(&self, run_id: &str) -> Option<TrackedRun> {
        self.runs.write().remove(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(run_id: &str, status: RunStatus) -> RunMetadata {
        RunMetadata {
            run_id: run_id.to_string(),
            app_id: "app".to_string(),
            board_id: "board".to_string(),
            node_id: "start".to_string(),
            version: Version::default(),
            status,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            log_count: 1,
        }
    }

    #[test]
    fn test_registry_tracks_updates() {
        let registry = RunRegistry::new();
        registry.start("r1", "app", "board");
        registry.record(&RunUpdate::Log {
            run_id: "r1".into(),
            log: RunLog::new("start", LogLevel::Info, "hello"),
        });
        registry.record(&RunUpdate::Finished {
            run_id: "r1".into(),
            status: RunStatus::Success,
        });
        // Unknown run
        registry.record(&RunUpdate::Started { run_id: "r2".into() });

        let run = registry.get("r1").unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.logs.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_finish_and_remove() {
        let registry = RunRegistry::new();
        registry.finish(metadata("r1", RunStatus::Failed));
        assert_eq!(registry.list("app", "board").len(), 1);
        assert!(registry.list("app", "other").is_empty());

        let removed = registry.remove("r1").unwrap();
        assert_eq!(removed.status, RunStatus::Failed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_run_update_wire_format() {
        let update = RunUpdate::Finished {
            run_id: "r1".into(),
            status: RunStatus::Success,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["update_type"], "Finished");
        assert_eq!(json["status"], "Success");
    }
}
