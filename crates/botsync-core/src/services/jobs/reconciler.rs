//! Reconciler
//!
//! Pure merge of a status response into the entity and its view state, plus
//! classification of what the polling loop should do next. No I/O happens
//! here, so every rule can be tested without a backend.
//!
//! Classification order:
//! 1. Superseded: the response names a job id, the loop was started for a
//!    job id, and the two differ.
//! 2. Terminal: `job_status` or `status` is `failed` or `succeeded`.
//!    `failed` on either field wins over `succeeded` on the other.
//! 3. Continue otherwise.

use crate::models::{StatusResponse, SyncEntity, SyncStatus};

use super::view::JobViewState;

/// Shown when a job fails without any message
pub const DEFAULT_FAILURE_MESSAGE: &str = "Sync failed.";

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Succeeded,
    Failed(String),
}

/// What the polling loop does after a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Poll again after the interval
    Continue,
    /// A newer job owns the target; hand over without notifying or reloading
    Superseded,
    /// The job finished; stop and reload
    Terminal(JobResult),
}

impl Outcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue)
    }
}

/// Result of [`merge`]
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Updated entity, `None` when the target is not in the store
    pub entity: Option<SyncEntity>,
    pub view: JobViewState,
    pub outcome: Outcome,
}

/// Decide the loop's next step for `response`
pub fn classify(response: &StatusResponse, expected_job_id: Option<&str>) -> Outcome {
    if let (Some(reported), Some(expected)) = (response.job_id.as_deref(), expected_job_id) {
        if !reported.is_empty() && !expected.is_empty() && reported != expected {
            return Outcome::Superseded;
        }
    }

    let statuses = [response.job_status, response.status];
    if statuses.contains(&Some(SyncStatus::Failed)) {
        let message = response
            .effective_job_message()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE);
        return Outcome::Terminal(JobResult::Failed(message.to_string()));
    }
    if statuses.contains(&Some(SyncStatus::Succeeded)) {
        return Outcome::Terminal(JobResult::Succeeded);
    }

    Outcome::Continue
}

/// Copy the reported status fields onto the entity.
///
/// Messages and job fields are taken as reported (absent clears them);
/// `status` and `job_id` keep their last known value when absent.
pub fn reconcile_entity(entity: &SyncEntity, response: &StatusResponse) -> SyncEntity {
    let mut updated = entity.clone();
    if let Some(status) = response.status {
        updated.sync_status = status;
    }
    updated.sync_status_message = response.message.clone();
    if let Some(job_id) = response.job_id.as_ref().filter(|id| !id.is_empty()) {
        updated.current_job_id = Some(job_id.clone());
    }
    updated.job_status = response.job_status;
    updated.job_message = response.job_message.clone();
    updated
}

/// Copy the reported job details onto the view state
pub fn reconcile_view(
    view: &JobViewState,
    response: &StatusResponse,
    outcome: &Outcome,
) -> JobViewState {
    JobViewState {
        job_id: response
            .job_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| view.job_id.clone()),
        job_status: response.effective_job_status().or(view.job_status),
        job_message: response.effective_job_message().map(str::to_string),
        is_polling: outcome.is_continue(),
    }
}

/// Merge `response` into `entity` and `view` and classify the outcome
pub fn merge(
    entity: Option<&SyncEntity>,
    view: &JobViewState,
    response: &StatusResponse,
    expected_job_id: Option<&str>,
) -> Reconciled {
    let outcome = classify(response, expected_job_id);
    Reconciled {
        entity: entity.map(|e| reconcile_entity(e, response)),
        view: reconcile_view(view, response, &outcome),
        outcome,
    }
}
