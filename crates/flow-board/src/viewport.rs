//! Viewport cache
//!
//! Remembers pan and zoom per (app, board, layer path) so returning to a
//! sub-graph restores the last view. The cache is a client-side
//! convenience: losing it only costs the stored views.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{defaults, SessionConfig};
use crate::error::Result;
use crate::projection::Projection;

/// Pan and zoom of the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
    pub updated_at: DateTime<Utc>,
}

impl Viewport {
    pub fn new(x: f32, y: f32, zoom: f32) -> Self {
        Self {
            x,
            y,
            zoom,
            updated_at: Utc::now(),
        }
    }
}

/// Cache key of a view: `"{app}:{board}:{layer_path}"`, `root` at the root
pub fn viewport_key(app_id: &str, board_id: &str, layer_path: Option<&str>) -> String {
    let path = layer_path.filter(|p| !p.is_empty()).unwrap_or("root");
    format!("{}:{}:{}", app_id, board_id, path)
}

/// Viewports keyed by [`viewport_key`], optionally persisted to a JSON file
#[derive(Debug, Default)]
pub struct ViewportStore {
    entries: RwLock<HashMap<String, Viewport>>,
    persist_path: Option<PathBuf>,
}

impl ViewportStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by the given file
    ///
    /// The parent directory is created when saving.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load stored viewports, returning how many were read
    ///
    /// A missing file is an empty store; an unreadable one is logged and
    /// ignored.
    pub fn load_from_disk(&self) -> Result<usize> {
        let Some(loaded) = self.read_disk()? else {
            return Ok(0);
        };
        let count = loaded.len();
        self.entries.write().extend(loaded);
        log::info!("Loaded {} viewport(s) from {:?}", count, self.persist_path);
        Ok(count)
    }

    fn read_disk(&self) -> Result<Option<HashMap<String, Viewport>>> {
        let Some(ref path) = self.persist_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(loaded) => Ok(Some(loaded)),
            Err(e) => {
                log::warn!("Failed to parse viewports from {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Pull in entries another store wrote to the same file
    ///
    /// The most recently updated view wins per key.
    fn merge_from_disk(&self, entries: &mut HashMap<String, Viewport>) -> Result<()> {
        let Some(stored) = self.read_disk()? else {
            return Ok(());
        };
        for (key, viewport) in stored {
            match entries.get(&key) {
                Some(current) if current.updated_at >= viewport.updated_at => {}
                _ => {
                    entries.insert(key, viewport);
                }
            }
        }
        Ok(())
    }

    fn write_disk(&self, entries: &HashMap<String, Viewport>) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(path, content)?;
        log::debug!("Saved viewports to {:?}", path);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Viewport> {
        self.entries.read().get(key).copied()
    }

    /// Store a viewport, stamping it with the current time
    pub fn save(&self, key: &str, x: f32, y: f32, zoom: f32) -> Result<Viewport> {
        let viewport = Viewport::new(x, y, zoom);
        let mut entries = self.entries.write();
        self.merge_from_disk(&mut entries)?;
        entries.insert(key.to_string(), viewport);
        self.write_disk(&entries)?;
        Ok(viewport)
    }

    pub fn remove(&self, key: &str) -> Result<Option<Viewport>> {
        let mut entries = self.entries.write();
        self.merge_from_disk(&mut entries)?;
        let removed = entries.remove(key);
        if removed.is_some() {
            self.write_disk(&entries)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Axis-aligned box around visible content
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Bounds of every visual node, each assumed to have the default footprint
pub fn content_bounds(projection: &Projection) -> Option<Bounds> {
    projection.nodes.iter().fold(None, |bounds, node| {
        let (x, y, _) = node.position;
        let right = x + defaults::NODE_WIDTH;
        let bottom = y + defaults::NODE_HEIGHT;
        Some(match bounds {
            None => Bounds {
                min_x: x,
                min_y: y,
                max_x: right,
                max_y: bottom,
            },
            Some(b) => Bounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(right),
                max_y: b.max_y.max(bottom),
            },
        })
    })
}

/// A viewport that fits all visible content into the canvas
///
/// Without content the view is reset to the origin at zoom 1.
pub fn fit_view(projection: &Projection, config: &SessionConfig) -> Viewport {
    let Some(bounds) = content_bounds(projection) else {
        return Viewport::new(0.0, 0.0, 1.0);
    };
    let (canvas_width, canvas_height) = config.canvas_size;
    let padded_width = bounds.width() * (1.0 + config.fit_padding);
    let padded_height = bounds.height() * (1.0 + config.fit_padding);
    let (min_zoom, max_zoom) = config.zoom_range();
    let zoom = (canvas_width / padded_width)
        .min(canvas_height / padded_height)
        .clamp(min_zoom, max_zoom);

    let center_x = bounds.min_x + bounds.width() / 2.0;
    let center_y = bounds.min_y + bounds.height() / 2.0;
    Viewport::new(
        canvas_width / 2.0 - center_x * zoom,
        canvas_height / 2.0 - center_y * zoom,
        zoom,
    )
}
