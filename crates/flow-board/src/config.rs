//! Configuration types for editing sessions

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};

/// Default values for session configuration
pub mod defaults {
    /// Maximum undo entries kept per board
    pub const HISTORY_LIMIT: usize = 100;
    /// Padding around content when fitting the view, as a fraction of its size
    pub const FIT_PADDING: f32 = 0.1;
    pub const MIN_ZOOM: f32 = 0.1;
    pub const MAX_ZOOM: f32 = 2.0;
    /// Canvas size assumed when fitting the view without a host viewport
    pub const CANVAS_WIDTH: f32 = 1280.0;
    pub const CANVAS_HEIGHT: f32 = 720.0;
    /// Footprint assumed for a node when measuring content bounds
    pub const NODE_WIDTH: f32 = 240.0;
    pub const NODE_HEIGHT: f32 = 120.0;
    /// Capacity of the editor event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// Configuration for a [`BoardSession`](crate::session::BoardSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum undo entries kept per board
    pub history_limit: usize,
    /// JSON file backing the viewport cache; memory only when `None`
    pub viewport_store_path: Option<PathBuf>,
    pub fit_padding: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Canvas size used by `fit_view`
    pub canvas_size: (f32, f32),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: defaults::HISTORY_LIMIT,
            viewport_store_path: None,
            fit_padding: defaults::FIT_PADDING,
            min_zoom: defaults::MIN_ZOOM,
            max_zoom: defaults::MAX_ZOOM,
            canvas_size: (defaults::CANVAS_WIDTH, defaults::CANVAS_HEIGHT),
        }
    }
}

impl SessionConfig {
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_viewport_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.viewport_store_path = Some(path.into());
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: f32, max_zoom: f32) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Check the values a hand-edited file could get wrong
    pub fn validate(&self) -> Result<()> {
        let positive = |value: f32| value.is_finite() && value > 0.0;
        if !positive(self.min_zoom) || !positive(self.max_zoom) || self.min_zoom > self.max_zoom {
            return Err(BoardError::InvalidConfig(format!(
                "zoom range {}..{} must be positive and ordered",
                self.min_zoom, self.max_zoom
            )));
        }
        if !self.fit_padding.is_finite() || self.fit_padding < 0.0 {
            return Err(BoardError::InvalidConfig(format!(
                "fit padding {} must be a non-negative number",
                self.fit_padding
            )));
        }
        let (width, height) = self.canvas_size;
        if !positive(width) || !positive(height) {
            return Err(BoardError::InvalidConfig(format!(
                "canvas size {}x{} must be positive",
                width, height
            )));
        }
        Ok(())
    }

    /// Zoom bounds usable with `clamp`, falling back to the defaults when
    /// the configured pair is invalid
    pub fn zoom_range(&self) -> (f32, f32) {
        let (min, max) = (self.min_zoom, self.max_zoom);
        if min.is_finite() && max.is_finite() && min > 0.0 && min <= max {
            (min, max)
        } else {
            (defaults::MIN_ZOOM, defaults::MAX_ZOOM)
        }
    }
}
