//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod config;
pub mod sync;

use std::sync::Arc;

use anyhow::Result;
use botsync_core::{ApiConfig, HttpGateway, Notifier, SyncTracker, TrackerConfig};

use crate::output::{print_error, OutputFormat};

/// Shared context for all commands
pub struct Context {
    pub api: ApiConfig,
    pub tracker: TrackerConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    /// Gateway to the configured backend; fails on incomplete config
    pub fn gateway(&self) -> Result<Arc<HttpGateway>> {
        Ok(Arc::new(HttpGateway::new(self.api.clone())?))
    }

    /// Tracker whose notifications are printed to stderr
    pub fn sync_tracker(&self) -> Result<SyncTracker> {
        let notifier: Arc<dyn Notifier> = Arc::new(|message: &str| print_error(message));
        Ok(SyncTracker::new(self.gateway()?, notifier, self.tracker))
    }
}
