//! Configuration for the HTTP backend

use serde::{Deserialize, Serialize};

/// Default values for the HTTP backend
pub mod defaults {
    pub const BASE_URL: &str = "http://localhost:8080";
    /// Request timeout; streamed runs are bounded by it as a whole
    pub const TIMEOUT_SECS: u64 = 30;
}

/// Where and how to reach the remote runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            token: None,
            timeout_secs: defaults::TIMEOUT_SECS,
        }
    }
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
