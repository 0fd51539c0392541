//! Client configuration
//!
//! `ApiConfig` describes how to reach the backend API, `TrackerConfig` tunes
//! the job status polling loop. Both come with sensible defaults and can be
//! read from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the backend API base URL
pub const ENV_API_URL: &str = "BOTSYNC_API_URL";

/// Environment variable holding the chatbot whose syncs are managed
pub const ENV_CHATBOT_ID: &str = "BOTSYNC_CHATBOT_ID";

/// Environment variable holding the session/API token
pub const ENV_API_TOKEN: &str = "BOTSYNC_API_TOKEN";

/// Environment variable holding the request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "BOTSYNC_TIMEOUT_SECS";

/// Default backend API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// Delay between two status queries for the same job
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Lower bound for the poll interval, to avoid hammering the backend
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

// ============================================================================
// API Configuration
// ============================================================================

/// Connection settings for the backend API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://console.example.com/api`
    pub base_url: String,
    /// Chatbot whose sync targets are managed
    pub chatbot_id: String,
    /// Optional bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_seconds: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            chatbot_id: String::new(),
            token: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl ApiConfig {
    /// Create a configuration for the given API and chatbot
    pub fn new(base_url: impl Into<String>, chatbot_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            chatbot_id: chatbot_id.into(),
            ..Default::default()
        }
    }

    /// Read the configuration from `BOTSYNC_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_API_URL) {
            config.base_url = url;
        }
        if let Ok(id) = std::env::var(ENV_CHATBOT_ID) {
            config.chatbot_id = id;
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            if !token.trim().is_empty() {
                config.token = Some(token);
            }
        }
        if let Ok(secs) = std::env::var(ENV_TIMEOUT_SECS) {
            config.timeout_seconds = secs
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{} must be a number: {}", ENV_TIMEOUT_SECS, secs)))?;
        }

        Ok(config)
    }

    /// Check that the configuration can be used to talk to the backend
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(Error::config("API base URL is empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!(
                "API base URL must start with http:// or https://: {}",
                url
            )));
        }
        if self.chatbot_id.trim().is_empty() {
            return Err(Error::config(format!(
                "No chatbot selected (set {} or pass --chatbot)",
                ENV_CHATBOT_ID
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::config("Request timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds as u64)
    }
}

// ============================================================================
// Tracker Configuration
// ============================================================================

/// Settings for the job status polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Delay between the end of one status query and the start of the next
    pub poll_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TrackerConfig {
    /// Create a new configuration with the specified interval
    pub fn with_interval_ms(poll_interval_ms: u64) -> Self {
        Self { poll_interval_ms }.validate()
    }

    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            poll_interval_ms: self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
