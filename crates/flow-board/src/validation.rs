//! Connection validation
//!
//! Decides whether a candidate edge between two handles of the visible scope
//! is legal. Handles are resolved through the projection's pin cache, then
//! checked with the pin compatibility predicate. Nothing here mutates state,
//! so it is safe to call on every pointer move during a drag.

use crate::commands::ConnectPins;
use crate::error::Result;
use crate::pin::{is_compatible, PinType};
use crate::projection::PinCache;

/// Why a connection was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRejection {
    /// A handle is not a pin of the visible scope
    UnknownHandle { handle: String },
    /// Both handles belong to the same node or layer
    SelfLoop { owner_id: String },
    /// The pins fail the compatibility predicate
    Incompatible { source: String, target: String },
}

impl std::fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHandle { handle } => write!(f, "Unknown handle '{}'", handle),
            Self::SelfLoop { owner_id } => {
                write!(f, "Cannot connect '{}' to itself", owner_id)
            }
            Self::Incompatible { source, target } => {
                write!(f, "Pins '{}' and '{}' are not compatible", source, target)
            }
        }
    }
}

impl std::error::Error for ConnectionRejection {}

/// A validated connection, oriented output to input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub from_node: String,
    pub from_pin: String,
    pub to_node: String,
    pub to_pin: String,
}

impl ResolvedConnection {
    pub fn connect_command(&self) -> Result<ConnectPins> {
        ConnectPins::new(
            self.from_node.clone(),
            self.from_pin.clone(),
            self.to_node.clone(),
            self.to_pin.clone(),
        )
    }
}

/// Validate a connection between two handles
///
/// The handles may be given in either order; the result is oriented so that
/// `from_pin` is the output.
pub fn validate_connection(
    cache: &PinCache,
    source_handle: &str,
    target_handle: &str,
) -> std::result::Result<ResolvedConnection, ConnectionRejection> {
    let source = cache
        .get(source_handle)
        .ok_or_else(|| ConnectionRejection::UnknownHandle {
            handle: source_handle.to_string(),
        })?;
    let target = cache
        .get(target_handle)
        .ok_or_else(|| ConnectionRejection::UnknownHandle {
            handle: target_handle.to_string(),
        })?;

    if source.owner_id == target.owner_id {
        return Err(ConnectionRejection::SelfLoop {
            owner_id: source.owner_id.clone(),
        });
    }
    if !is_compatible(&source.pin, &target.pin, cache.refs()) {
        return Err(ConnectionRejection::Incompatible {
            source: source_handle.to_string(),
            target: target_handle.to_string(),
        });
    }

    let (from, to) = match source.pin.pin_type {
        PinType::Output => (source, target),
        PinType::Input => (target, source),
    };
    Ok(ResolvedConnection {
        from_node: from.owner_id.clone(),
        from_pin: from.pin.id.clone(),
        to_node: to.owner_id.clone(),
        to_pin: to.pin.id.clone(),
    })
}

/// Boolean form of [`validate_connection`] for drag feedback
pub fn is_valid_connection(cache: &PinCache, source_handle: &str, target_handle: &str) -> bool {
    match validate_connection(cache, source_handle, target_handle) {
        Ok(_) => true,
        Err(rejection) => {
            log::trace!("Connection refused: {}", rejection);
            false
        }
    }
}
