//! Per-target presentation state of the job being tracked
//!
//! Never persisted; lives as long as the tracker that owns it.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::SyncStatus;

use super::key::JobKey;

/// What a front end shows next to a target while (or after) tracking a job
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobViewState {
    pub job_id: Option<String>,
    pub job_status: Option<SyncStatus>,
    pub job_message: Option<String>,
    /// Drives the "checking status…" indicator
    pub is_polling: bool,
}

impl JobViewState {
    /// Fresh state for a job that tracking is about to start on
    pub fn tracking(job_id: Option<String>) -> Self {
        Self {
            job_id,
            job_status: Some(SyncStatus::Queued),
            job_message: None,
            is_polling: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobViews {
    states: HashMap<JobKey, JobViewState>,
}

impl JobViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &JobKey) -> Option<&JobViewState> {
        self.states.get(key)
    }

    pub fn set(&mut self, key: &JobKey, state: JobViewState) {
        self.states.insert(key.clone(), state);
    }

    /// Clear the polling flag; keeps the last job details for display
    pub fn mark_not_polling(&mut self, key: &JobKey) {
        if let Some(state) = self.states.get_mut(key) {
            state.is_polling = false;
        }
    }

    pub fn mark_all_not_polling(&mut self) {
        for state in self.states.values_mut() {
            state.is_polling = false;
        }
    }

    pub fn polling_count(&self) -> usize {
        self.states.values().filter(|s| s.is_polling).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
