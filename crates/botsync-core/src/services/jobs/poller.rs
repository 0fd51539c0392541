//! Status poller
//!
//! One loop per tracked target. Each iteration issues a single status query,
//! merges the answer under the tracker lock and decides whether to go again.
//! The next query is only scheduled after the previous one resolved, so
//! requests for the same key never overlap.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::Error;
use crate::models::SyncKind;

use super::key::JobKey;
use super::reconciler::{self, JobResult, Outcome};
use super::registry::PollTicket;
use super::tracker::Shared;

/// Polling loop for one [`JobKey`]
pub(crate) struct StatusPoller {
    shared: Arc<Shared>,
    ticket: PollTicket,
    /// Job id the loop was started for; `None` disables supersession checks
    expected_job_id: Option<String>,
}

impl StatusPoller {
    pub(crate) fn new(shared: Arc<Shared>, ticket: PollTicket, expected_job_id: Option<String>) -> Self {
        Self {
            shared,
            ticket,
            expected_job_id,
        }
    }

    /// Run the loop on the tokio runtime
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        // Boxed so the task type does not depend on itself through the
        // terminal reload, which may start new loops.
        let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(self.run());
        tokio::spawn(task)
    }

    async fn run(self) {
        let key = self.ticket.key().clone();
        let interval = self.shared.config.poll_interval();

        loop {
            let query = self.shared.gateway.query_status(key.kind(), key.id());
            let Some(result) = self.ticket.guard(query).await else {
                log::debug!("Polling {} cancelled during status query", key);
                return;
            };

            let mut state = self.shared.state.lock().await;
            if !state.registry.is_current(&self.ticket) {
                log::debug!("Dropping status of {} from a stopped loop", key);
                return;
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Status query for {} failed, polling stopped: {}", key, e);
                    state.registry.stop_ticket(&self.ticket);
                    state.views.mark_not_polling(&key);
                    drop(state);
                    self.shared.bump();
                    return;
                }
            };

            let previous = state.views.get(&key).cloned().unwrap_or_default();
            let merged = reconciler::merge(
                state.store.get(&key),
                &previous,
                &response,
                self.expected_job_id.as_deref(),
            );
            if let Some(entity) = merged.entity {
                state.store.update(&key, |current| *current = entity);
            }
            state.views.set(&key, merged.view);

            match merged.outcome {
                Outcome::Continue => {
                    drop(state);
                    self.shared.bump();
                    if !self.ticket.sleep(interval).await {
                        log::debug!("Polling {} cancelled while waiting", key);
                        return;
                    }
                }
                Outcome::Superseded => {
                    log::info!(
                        "Job {} on {} superseded by {}",
                        self.expected_job_id.as_deref().unwrap_or("-"),
                        key,
                        response.job_id.as_deref().unwrap_or("-")
                    );
                    state.registry.stop_ticket(&self.ticket);
                    // Hand the target over to a loop for the job now on record
                    self.shared.resume_kind(&mut state, key.kind());
                    drop(state);
                    self.shared.bump();
                    return;
                }
                Outcome::Terminal(result) => {
                    state.registry.stop_ticket(&self.ticket);
                    state.reloading += 1;
                    drop(state);
                    self.shared.bump();
                    self.finish(&key, result).await;
                    return;
                }
            }
        }
    }

    /// Surface the outcome, then reload the target's collection once
    async fn finish(&self, key: &JobKey, result: JobResult) {
        match result {
            JobResult::Succeeded => log::info!("Sync of {} succeeded", key),
            JobResult::Failed(message) => {
                log::warn!("Sync of {} failed: {}", key, message);
                if !self.shared.shutdown.is_cancelled() {
                    self.shared.notifier.notify(&message);
                }
            }
        }

        self.reload(key.kind()).await;

        let mut state = self.shared.state.lock().await;
        state.reloading = state.reloading.saturating_sub(1);
        drop(state);
        self.shared.bump();
    }

    async fn reload(&self, kind: SyncKind) {
        match self.shared.reload_kind(kind).await {
            Ok(resumed) if resumed > 0 => {
                log::info!("Resumed {} {} sync(s) after reload", resumed, kind)
            }
            Ok(_) => {}
            Err(Error::TrackerClosed) => log::debug!("Skipped {} reload after teardown", kind),
            Err(e) => log::warn!("Failed to reload {} syncs: {}", kind, e),
        }
    }
}
