//! HTTP backend for flow-board
//!
//! Connects [`flow_board::BoardSession`]s to a remote Flow Like runtime over
//! JSON routes. Run streams are newline-delimited JSON.

pub mod backend;
pub mod config;
pub mod error;
pub mod stream;

pub use backend::HttpBackend;
pub use config::HttpBackendConfig;
pub use error::HttpBackendError;
