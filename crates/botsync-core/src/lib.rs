//! # botsync-core
//!
//! Core logic for tracking chatbot source syncs - shared by every front end.
//!
//! This crate provides:
//! - Data models for sync targets and job payloads (`models` module)
//! - The sync job tracking core and the backend gateway (`services` module)
//! - API and polling configuration (`config` module)
//! - Unified error handling (`error` module)

pub mod config;
pub mod error;
pub mod models;
pub mod services;

// Re-exports for convenience
pub use config::{ApiConfig, TrackerConfig};
pub use error::{Error, Result};

// Re-export commonly used types from models
pub use models::{
    StatusResponse, SyncEntity, SyncKind, SyncStatus, SyncTarget, TriggerResponse,
};

// Re-export commonly used types from services
pub use services::{
    key_of, HttpGateway, JobKey, JobResult, JobViewState, LogNotifier, Notifier, Outcome,
    SyncTracker, TriggerGateway, TRIGGER_FAILED_MESSAGE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
