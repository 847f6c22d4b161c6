//! NDJSON run stream parsing
//!
//! A streamed run answers with one JSON document per line: run updates
//! while the board executes, then the final run metadata.

use flow_board::{RunMetadata, RunUpdate};
use serde::Deserialize;

use crate::error::HttpBackendError;

/// One decoded line of a run stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StreamLine {
    Update(RunUpdate),
    Metadata(RunMetadata),
}

/// Decode a line; blank lines are skipped
pub fn parse_line(line: &str) -> Result<Option<StreamLine>, HttpBackendError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Reassembles lines from arbitrarily split chunks
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and take every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// The unterminated tail left at the end of the stream
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}
