//! Flow Board - Board editing engine for Flow Like workflows
//!
//! This crate holds everything an editor needs to work on a board without a
//! UI toolkit. It supports:
//!
//! - Typed pins with a symmetric compatibility predicate
//! - Invertible, serializable commands batched for atomic application
//! - Per-board undo/redo history of applied commands
//! - Projection of one layer of a board into nodes, edges and a pin cache
//! - Pin-drag-to-place with greedy auto-wiring
//! - Per-layer viewport memory and run tracking
//!
//! # Architecture
//!
//! The backend is the source of truth. A [`BoardSession`] never mutates its
//! snapshot locally: it sends commands through a [`BoardBackend`], records
//! the applied result in the history and re-fetches the board.
//!
//! - `BoardBackend`: async seam to the runtime (see `MemoryBackend` for the
//!   in-process reference implementation)
//! - `BoardSession`: snapshot, projection, navigation, history, runs
//! - `EventSink`: notifications and editor events (not tied to a UI)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flow_board::{BoardSession, MemoryBackend, SessionConfig};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let mut session = BoardSession::open(backend, "app", "board", SessionConfig::default()).await?;
//! let dragged = session.dragged_pin("start/exec");
//! session.place_node("control_branch", (200.0, 0.0, 0.0), dragged.as_ref()).await?;
//! session.undo().await?;
//! ```

pub mod backend;
pub mod builder;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod history;
pub mod memory;
pub mod pin;
pub mod placement;
pub mod projection;
pub mod runs;
pub mod session;
pub mod types;
pub mod validation;
pub mod viewport;

// Re-export key types
pub use backend::{BoardBackend, NullRunObserver, RunObserver};
pub use builder::{BoardBuilder, NodeBuilder, PinBuilder};
pub use catalog::Catalog;
pub use commands::{BoardCommand, Command};
pub use config::SessionConfig;
pub use editor::EditorState;
pub use error::{BoardError, Result};
pub use events::{BoardEvent, EditorBus, EventSink, NotificationLevel};
pub use history::{CommandHistory, SharedHistory};
pub use memory::MemoryBackend;
pub use pin::{is_compatible, DataType, Pin, PinOptions, PinType, ValueType};
pub use placement::DraggedPin;
pub use projection::{project, PinCache, Projection, VisualEdge, VisualNode};
pub use runs::{RunMetadata, RunRegistry, RunRequest, RunStatus, RunUpdate};
pub use session::BoardSession;
pub use types::{Board, Comment, Layer, Node, Variable, Version, VersionBump};
pub use validation::{is_valid_connection, validate_connection, ConnectionRejection};
pub use viewport::{Viewport, ViewportStore};
