//! Editor events
//!
//! Events are sent from a session to the canvas and peripheral panels (or
//! any consumer) to report notifications, snapshot refreshes, navigation,
//! history changes and run progress.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::defaults;
use crate::runs::{RunStatus, RunUpdate};
use crate::types::{Node, Version};

/// Trait for sending editor events
///
/// This abstracts over the transport mechanism (broadcast channel, host
/// bridge, test collector) so sessions can be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: BoardEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Events emitted by an editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    /// Transient user-visible message
    #[serde(rename_all = "camelCase")]
    Notification {
        level: NotificationLevel,
        message: String,
    },

    /// A fresh snapshot was loaded and projected
    #[serde(rename_all = "camelCase")]
    BoardRefreshed {
        board_id: String,
        version: Version,
    },

    /// The open layer changed
    #[serde(rename_all = "camelCase")]
    LayerChanged {
        board_id: String,
        current_layer: Option<String>,
        layer_path: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SelectionChanged {
        board_id: String,
        selected: Vec<String>,
    },

    /// Undo/redo availability changed
    #[serde(rename_all = "camelCase")]
    HistoryChanged {
        board_id: String,
        can_undo: bool,
        can_redo: bool,
    },

    #[serde(rename_all = "camelCase")]
    RunStarted {
        board_id: String,
        run_id: String,
    },

    /// Streamed progress of a run
    #[serde(rename_all = "camelCase")]
    RunProgress {
        board_id: String,
        update: RunUpdate,
    },

    #[serde(rename_all = "camelCase")]
    RunFinished {
        board_id: String,
        run_id: String,
        status: RunStatus,
    },

    /// A catalog node was dropped on the canvas by a peripheral panel
    #[serde(rename_all = "camelCase")]
    CatalogDrop {
        node: Box<Node>,
        position: (f32, f32),
    },
}

impl BoardEvent {
    pub fn notification(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self::Notification {
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::notification(NotificationLevel::Error, message)
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: BoardEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<BoardEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<BoardEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: BoardEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// In-process publish/subscribe channel scoped to one editor
///
/// Dropping the bus closes the channel; subscribers then observe
/// `RecvError::Closed`.
pub struct EditorBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl EditorBus {
    pub fn new() -> Self {
        Self::with_capacity(defaults::EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EditorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EditorBus {
    fn send(&self, event: BoardEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| EventError::channel_closed())
    }
}
