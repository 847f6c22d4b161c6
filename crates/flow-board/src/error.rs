//! Error types for the board engine

use thiserror::Error;

use crate::types::Version;

/// Result type alias using BoardError
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors that can occur while editing or executing a board
#[derive(Debug, Error)]
pub enum BoardError {
    /// The board is pinned to a historical version and cannot be edited
    #[error("Board is pinned to version {version} and is read-only")]
    ReadOnlyVersion { version: Version },

    /// The backend rejected a request or could not be reached
    #[error("Backend error: {0}")]
    Backend(String),

    /// A command was constructed with invalid operands
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Board not found in the backend
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Pin not found: {0}")]
    PinNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// An entity with this id already exists on the board
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// The two pins are already connected
    #[error("Pins '{from}' and '{to}' are already connected")]
    AlreadyConnected { from: String, to: String },

    /// The two pins are not connected
    #[error("Pins '{from}' and '{to}' are not connected")]
    NotConnected { from: String, to: String },

    /// Session configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// Create a backend error with a message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an invalid command error with a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Whether this error is the read-only version condition
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnlyVersion { .. })
    }
}
