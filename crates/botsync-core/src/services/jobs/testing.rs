//! In-memory gateway for loop tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{StatusResponse, SyncEntity, SyncKind, SyncStatus, TriggerResponse};
use crate::services::gateway::TriggerGateway;

use super::key::JobKey;
use super::reconciler;

pub(crate) fn status(json: &str) -> StatusResponse {
    serde_json::from_str(json).unwrap()
}

#[derive(Debug, Clone)]
enum Reply<T> {
    Ok(T),
    Fail,
}

/// Replies are served in order; the last one repeats forever
#[derive(Debug)]
struct Script<T> {
    replies: VecDeque<Reply<T>>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<Reply<T>> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    statuses: HashMap<JobKey, Script<StatusResponse>>,
    triggers: HashMap<JobKey, Script<TriggerResponse>>,
    collections: HashMap<SyncKind, Vec<SyncEntity>>,
    failing_reloads: Vec<SyncKind>,
    trigger_calls: HashMap<JobKey, usize>,
    query_calls: HashMap<JobKey, usize>,
    reload_calls: HashMap<SyncKind, usize>,
    latency: Option<Duration>,
}

impl Inner {
    /// Mirror what the backend would persist for a served status
    fn apply_status(&mut self, key: &JobKey, response: &StatusResponse) {
        if let Some(entity) = self.entity_mut(key) {
            let updated = reconciler::reconcile_entity(entity, response);
            *entity = updated;
        }
    }

    fn apply_trigger(&mut self, key: &JobKey, response: &TriggerResponse) {
        if let Some(entity) = self.entity_mut(key) {
            entity.sync_status = response.status.unwrap_or(SyncStatus::Queued);
            entity.current_job_id = Some(response.job_id.clone());
        }
    }

    fn entity_mut(&mut self, key: &JobKey) -> Option<&mut SyncEntity> {
        self.collections
            .get_mut(&key.kind())
            .and_then(|entities| entities.iter_mut().find(|e| e.id == key.id()))
    }
}

/// Scripted [`TriggerGateway`] with call counters
#[derive(Debug, Default)]
pub(crate) struct ScriptedGateway {
    inner: Mutex<Inner>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_collection(&self, kind: SyncKind, entities: Vec<SyncEntity>) {
        self.inner.lock().unwrap().collections.insert(kind, entities);
    }

    pub(crate) fn script_statuses(&self, key: &JobKey, responses: Vec<StatusResponse>) {
        let replies = responses.into_iter().map(Reply::Ok).collect();
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(key.clone(), Script { replies });
    }

    pub(crate) fn fail_status(&self, key: &JobKey) {
        let replies = VecDeque::from([Reply::Fail]);
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(key.clone(), Script { replies });
    }

    pub(crate) fn script_trigger(&self, key: &JobKey, response: TriggerResponse) {
        let replies = VecDeque::from([Reply::Ok(response)]);
        self.inner
            .lock()
            .unwrap()
            .triggers
            .insert(key.clone(), Script { replies });
    }

    pub(crate) fn fail_trigger(&self, key: &JobKey) {
        let replies = VecDeque::from([Reply::Fail]);
        self.inner
            .lock()
            .unwrap()
            .triggers
            .insert(key.clone(), Script { replies });
    }

    pub(crate) fn fail_reload(&self, kind: SyncKind) {
        self.inner.lock().unwrap().failing_reloads.push(kind);
    }

    /// Delay every reply by `latency` (virtual time in paused tests)
    pub(crate) fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = Some(latency);
    }

    pub(crate) fn reset_counters(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.trigger_calls.clear();
        inner.query_calls.clear();
        inner.reload_calls.clear();
    }

    pub(crate) fn trigger_count(&self, key: &JobKey) -> usize {
        self.inner.lock().unwrap().trigger_calls.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn query_count(&self, key: &JobKey) -> usize {
        self.inner.lock().unwrap().query_calls.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn reload_count(&self, kind: SyncKind) -> usize {
        self.inner.lock().unwrap().reload_calls.get(&kind).copied().unwrap_or(0)
    }

    async fn delay(&self) {
        let latency = self.inner.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn unavailable() -> Error {
    Error::Api {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[async_trait]
impl TriggerGateway for ScriptedGateway {
    async fn trigger_now(&self, kind: SyncKind, id: &str) -> Result<TriggerResponse> {
        let key = JobKey::new(kind, id);
        *self
            .inner
            .lock()
            .unwrap()
            .trigger_calls
            .entry(key.clone())
            .or_default() += 1;
        self.delay().await;

        let mut inner = self.inner.lock().unwrap();
        match inner.triggers.get_mut(&key).and_then(Script::next) {
            Some(Reply::Ok(response)) => {
                inner.apply_trigger(&key, &response);
                Ok(response)
            }
            Some(Reply::Fail) => Err(unavailable()),
            None => Err(Error::not_found(format!("no trigger scripted for {}", key))),
        }
    }

    async fn query_status(&self, kind: SyncKind, id: &str) -> Result<StatusResponse> {
        let key = JobKey::new(kind, id);
        *self
            .inner
            .lock()
            .unwrap()
            .query_calls
            .entry(key.clone())
            .or_default() += 1;
        self.delay().await;

        let mut inner = self.inner.lock().unwrap();
        match inner.statuses.get_mut(&key).and_then(Script::next) {
            Some(Reply::Ok(response)) => {
                inner.apply_status(&key, &response);
                Ok(response)
            }
            Some(Reply::Fail) => Err(unavailable()),
            None => Err(Error::not_found(format!("no status scripted for {}", key))),
        }
    }

    async fn reload_all(&self, kind: SyncKind) -> Result<Vec<SyncEntity>> {
        *self
            .inner
            .lock()
            .unwrap()
            .reload_calls
            .entry(kind)
            .or_default() += 1;
        self.delay().await;

        let inner = self.inner.lock().unwrap();
        if inner.failing_reloads.contains(&kind) {
            return Err(unavailable());
        }
        Ok(inner.collections.get(&kind).cloned().unwrap_or_default())
    }
}
