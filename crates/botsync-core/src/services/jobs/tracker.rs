//! Sync tracker
//!
//! Owning context of the tracking core. The registry, the entity store and
//! the view table live behind one async mutex so that a loop's liveness check
//! and the merge it guards happen as one step.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::models::{SyncEntity, SyncKind, SyncStatus};
use crate::services::gateway::TriggerGateway;
use crate::services::notify::{LogNotifier, Notifier, TRIGGER_FAILED_MESSAGE};

use super::key::JobKey;
use super::poller::StatusPoller;
use super::registry::PollRegistry;
use super::store::SyncEntityStore;
use super::view::{JobViewState, JobViews};

// ============================================================================
// Shared State
// ============================================================================

pub(crate) struct TrackerState {
    pub(crate) registry: PollRegistry,
    pub(crate) store: SyncEntityStore,
    pub(crate) views: JobViews,
    /// Terminal reloads still in progress
    pub(crate) reloading: usize,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<TrackerState>,
    pub(crate) gateway: Arc<dyn TriggerGateway>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: TrackerConfig,
    pub(crate) shutdown: CancellationToken,
    revision: watch::Sender<u64>,
}

impl Shared {
    /// Tell subscribers that state changed
    pub(crate) fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Register a loop for `key` and spawn it. Replaces any running loop.
    fn start_loop(
        self: &Arc<Self>,
        state: &mut TrackerState,
        key: &JobKey,
        expected_job_id: Option<String>,
        view: JobViewState,
    ) {
        let ticket = state.registry.start(key);
        state.views.set(key, view);
        log::info!(
            "Polling {} for job {}",
            key,
            expected_job_id.as_deref().unwrap_or("-")
        );
        StatusPoller::new(Arc::clone(self), ticket, expected_job_id).spawn();
    }

    /// Start loops for every in-flight entity of `kind` that is not tracked yet
    pub(crate) fn resume_kind(self: &Arc<Self>, state: &mut TrackerState, kind: SyncKind) -> usize {
        if state.registry.is_closed() {
            return 0;
        }

        let mut started = 0;
        for (key, job_id) in state.store.in_flight(kind) {
            if state.registry.is_active(&key) {
                continue;
            }
            let view = state
                .store
                .get(&key)
                .map(|entity| JobViewState {
                    job_id: Some(job_id.clone()),
                    job_status: entity.job_status.or(Some(entity.sync_status)),
                    job_message: entity.job_message.clone(),
                    is_polling: true,
                })
                .unwrap_or_else(|| JobViewState::tracking(Some(job_id.clone())));
            self.start_loop(state, &key, Some(job_id), view);
            started += 1;
        }
        started
    }

    /// Replace the collection for `kind` from the backend and resume its
    /// in-flight jobs. Returns how many loops were started.
    pub(crate) async fn reload_kind(self: &Arc<Self>, kind: SyncKind) -> Result<usize> {
        let entities = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(Error::TrackerClosed),
            fetched = self.gateway.reload_all(kind) => fetched?,
        };

        let mut state = self.state.lock().await;
        if state.registry.is_closed() {
            return Err(Error::TrackerClosed);
        }
        log::debug!("Loaded {} {} sync(s)", entities.len(), kind);
        state.store.replace(kind, entities);
        let resumed = self.resume_kind(&mut state, kind);
        drop(state);
        self.bump();
        Ok(resumed)
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Tracks sync jobs of one chatbot from trigger (or resumption) to a
/// terminal outcome.
///
/// Dropping the tracker cancels every loop it started.
pub struct SyncTracker {
    shared: Arc<Shared>,
    _shutdown: DropGuard,
}

impl SyncTracker {
    pub fn new(
        gateway: Arc<dyn TriggerGateway>,
        notifier: Arc<dyn Notifier>,
        config: TrackerConfig,
    ) -> Self {
        let registry = PollRegistry::new();
        let shutdown = registry.shutdown_token();
        let (revision, _) = watch::channel(0);

        let shared = Arc::new(Shared {
            state: Mutex::new(TrackerState {
                registry,
                store: SyncEntityStore::new(),
                views: JobViews::new(),
                reloading: 0,
            }),
            gateway,
            notifier,
            config: config.validate(),
            shutdown: shutdown.clone(),
            revision,
        });

        Self {
            shared,
            _shutdown: shutdown.drop_guard(),
        }
    }

    /// Tracker with the default poll interval that logs notifications
    pub fn with_defaults(gateway: Arc<dyn TriggerGateway>) -> Self {
        Self::new(gateway, Arc::new(LogNotifier), TrackerConfig::default())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Ask the backend to run a sync now and track the new job.
    ///
    /// Returns the new job id. A rejected trigger notifies the user and
    /// starts nothing.
    pub async fn trigger_sync(&self, kind: SyncKind, id: &str) -> Result<String> {
        let key = target_key(kind, id)?;
        self.ensure_open().await?;

        let response = tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => return Err(Error::TrackerClosed),
            response = self.shared.gateway.trigger_now(kind, id) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to queue sync for {}: {}", key, e);
                if !self.shared.shutdown.is_cancelled() {
                    self.shared.notifier.notify(TRIGGER_FAILED_MESSAGE);
                }
                return Err(Error::TriggerRejected(e.to_string()));
            }
        };

        let mut state = self.shared.state.lock().await;
        if state.registry.is_closed() {
            return Err(Error::TrackerClosed);
        }

        let status = response.status.unwrap_or(SyncStatus::Queued);
        let job_id = response.job_id.clone();
        state.store.update(&key, |entity| {
            entity.sync_status = status;
            entity.sync_status_message = response.message.clone();
            entity.current_job_id = Some(job_id.clone()).filter(|id| !id.is_empty());
            entity.job_status = Some(status);
            entity.job_message = None;
        });

        let expected = Some(job_id.clone()).filter(|id| !id.is_empty());
        let view = JobViewState {
            job_id: expected.clone(),
            job_status: Some(status),
            job_message: response.message.clone(),
            is_polling: true,
        };
        self.shared.start_loop(&mut state, &key, expected, view);
        drop(state);
        self.shared.bump();

        Ok(job_id)
    }

    /// Start tracking `id` without triggering a job.
    ///
    /// With `expected_job_id` set, the loop yields to any other job it
    /// observes on the target.
    pub async fn track(
        &self,
        kind: SyncKind,
        id: &str,
        expected_job_id: Option<String>,
    ) -> Result<()> {
        let key = target_key(kind, id)?;
        let mut state = self.shared.state.lock().await;
        if state.registry.is_closed() {
            return Err(Error::TrackerClosed);
        }

        let mut view = JobViewState::tracking(expected_job_id.clone());
        if let Some(entity) = state.store.get(&key) {
            view.job_status = entity.job_status.or(Some(entity.sync_status));
            view.job_message = entity.job_message.clone();
        }
        self.shared.start_loop(&mut state, &key, expected_job_id, view);
        drop(state);
        self.shared.bump();
        Ok(())
    }

    /// Load every collection and resume tracking of in-flight jobs.
    ///
    /// A kind that fails to load is skipped with a warning; the call fails
    /// only when no kind could be loaded. Returns how many loops started.
    pub async fn mount_resume(&self) -> Result<usize> {
        self.ensure_open().await?;

        let mut resumed = 0;
        let mut first_error = None;
        let mut loaded = 0;

        for kind in SyncKind::ALL {
            match self.shared.reload_kind(kind).await {
                Ok(started) => {
                    loaded += 1;
                    resumed += started;
                }
                Err(Error::TrackerClosed) => return Err(Error::TrackerClosed),
                Err(e) => {
                    log::warn!("Failed to load {} syncs: {}", kind, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if loaded == 0 => Err(e),
            _ => {
                log::info!("Resumed tracking of {} in-flight job(s)", resumed);
                Ok(resumed)
            }
        }
    }

    /// Reload one collection, resuming any in-flight jobs it shows
    pub async fn reload(&self, kind: SyncKind) -> Result<usize> {
        self.ensure_open().await?;
        self.shared.reload_kind(kind).await
    }

    /// Stop tracking `id`. No-op when it is not tracked.
    pub async fn stop(&self, kind: SyncKind, id: &str) -> bool {
        let key = JobKey::new(kind, id);
        let mut state = self.shared.state.lock().await;
        let stopped = state.registry.stop(&key);
        if stopped {
            state.views.mark_not_polling(&key);
            log::info!("Stopped polling {}", key);
        }
        drop(state);
        if stopped {
            self.shared.bump();
        }
        stopped
    }

    /// Stop every loop and refuse further commands. Returns how many loops
    /// were running; later calls return 0.
    pub async fn teardown(&self) -> usize {
        let mut state = self.shared.state.lock().await;
        if state.registry.is_closed() {
            return 0;
        }
        let stopped = state.registry.close();
        state.views.mark_all_not_polling();
        drop(state);

        log::info!("Tracker torn down, {} loop(s) stopped", stopped);
        self.shared.bump();
        stopped
    }

    // ------------------------------------------------------------------------
    // Read Access
    // ------------------------------------------------------------------------

    pub async fn entities(&self, kind: SyncKind) -> Vec<SyncEntity> {
        self.shared.state.lock().await.store.list(kind).to_vec()
    }

    pub async fn entity(&self, key: &JobKey) -> Option<SyncEntity> {
        self.shared.state.lock().await.store.get(key).cloned()
    }

    pub async fn job_view(&self, key: &JobKey) -> Option<JobViewState> {
        self.shared.state.lock().await.views.get(key).cloned()
    }

    /// Whether a loop is live for `key`
    pub async fn is_polling(&self, key: &JobKey) -> bool {
        self.shared.state.lock().await.registry.is_active(key)
    }

    pub async fn active_count(&self) -> usize {
        self.shared.state.lock().await.registry.len()
    }

    pub async fn active_keys(&self) -> Vec<JobKey> {
        self.shared.state.lock().await.registry.keys()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Receiver that ticks on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// No loop is live and no terminal reload is pending
    pub async fn is_idle(&self) -> bool {
        is_idle(&*self.shared.state.lock().await)
    }

    /// No terminal reload is pending. Loops may still be live.
    pub async fn is_settled(&self) -> bool {
        self.shared.state.lock().await.reloading == 0
    }

    /// Wait until [`is_idle`](Self::is_idle) holds
    pub async fn wait_idle(&self) {
        self.wait_for(is_idle).await
    }

    /// Wait until [`is_settled`](Self::is_settled) holds
    pub async fn wait_settled(&self) {
        self.wait_for(|state| state.reloading == 0).await
    }

    async fn wait_for(&self, done: impl Fn(&TrackerState) -> bool) {
        loop {
            let mut changes = self.subscribe();
            if done(&*self.shared.state.lock().await) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.shared.state.lock().await.registry.is_closed() {
            return Err(Error::TrackerClosed);
        }
        Ok(())
    }
}

fn is_idle(state: &TrackerState) -> bool {
    state.registry.is_empty() && state.reloading == 0
}

fn target_key(kind: SyncKind, id: &str) -> Result<JobKey> {
    if id.trim().is_empty() {
        return Err(Error::validation(format!("Empty {} sync id", kind)));
    }
    Ok(JobKey::new(kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::{SyncTarget, TriggerResponse};
    use crate::services::jobs::testing::{status, ScriptedGateway};
    use crate::services::notify::testing::RecordingNotifier;

    const JIRA_5: (SyncKind, &str) = (SyncKind::Jira, "5");

    fn jira(id: &str) -> SyncEntity {
        SyncEntity::new(
            id,
            SyncTarget::Jira {
                board_url: format!("https://example.atlassian.net/board/{}", id),
            },
        )
    }

    fn in_flight(mut entity: SyncEntity, job_id: &str) -> SyncEntity {
        entity.sync_status = SyncStatus::Running;
        entity.current_job_id = Some(job_id.to_string());
        entity
    }

    fn key(kind: SyncKind, id: &str) -> JobKey {
        JobKey::new(kind, id)
    }

    fn queued(job_id: &str) -> TriggerResponse {
        TriggerResponse {
            status: Some(SyncStatus::Queued),
            message: Some("Sync job queued.".to_string()),
            job_id: job_id.to_string(),
        }
    }

    struct Harness {
        gateway: Arc<ScriptedGateway>,
        notifier: Arc<RecordingNotifier>,
        tracker: SyncTracker,
    }

    /// Tracker over a gateway whose Jira collection is `jira`
    async fn harness(jira_entities: Vec<SyncEntity>) -> Harness {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_collection(SyncKind::Jira, jira_entities);
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = SyncTracker::new(
            gateway.clone(),
            notifier.clone(),
            TrackerConfig::default(),
        );
        tracker.reload(SyncKind::Jira).await.unwrap();
        gateway.reset_counters();

        Harness {
            gateway,
            notifier,
            tracker,
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_trigger_then_success_reloads_once() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.script_trigger(&k, queued("abc"));
        h.gateway.script_statuses(
            &k,
            vec![
                status(r#"{"status":"running","job_id":"abc"}"#),
                status(r#"{"status":"succeeded","job_id":"abc"}"#),
            ],
        );

        let job_id = h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap();
        assert_eq!(job_id, "abc");
        assert!(h.tracker.is_polling(&k).await);

        h.tracker.wait_idle().await;

        assert_eq!(h.gateway.query_count(&k), 2);
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 1);
        assert!(h.notifier.messages().is_empty());

        let view = h.tracker.job_view(&k).await.unwrap();
        assert!(!view.is_polling);
        assert_eq!(view.job_status, Some(SyncStatus::Succeeded));
        assert_eq!(
            h.tracker.entity(&k).await.unwrap().sync_status,
            SyncStatus::Succeeded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_job_hands_over_silently() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.script_trigger(&k, queued("abc"));
        h.gateway.script_statuses(
            &k,
            vec![
                status(r#"{"job_id":"xyz"}"#),
                status(r#"{"status":"succeeded","job_id":"xyz"}"#),
            ],
        );

        h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap();
        h.tracker.wait_idle().await;

        // One query from the loop for abc, one from the loop for xyz
        assert!(!h.tracker.is_polling(&k).await);
        assert_eq!(h.gateway.query_count(&k), 2);
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 1);
        assert!(h.notifier.messages().is_empty());

        let view = h.tracker.job_view(&k).await.unwrap();
        assert_eq!(view.job_id.as_deref(), Some("xyz"));
        assert_eq!(view.job_status, Some(SyncStatus::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_notifies_and_reloads_once() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.script_trigger(&k, queued("abc"));
        h.gateway.script_statuses(
            &k,
            vec![status(
                r#"{"status":"failed","job_id":"abc","job_message":"auth error"}"#,
            )],
        );

        h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap();
        h.tracker.wait_idle().await;

        assert_eq!(h.notifier.messages(), vec!["auth error".to_string()]);
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 1);
        assert_eq!(
            h.tracker.entity(&k).await.unwrap().sync_status,
            SyncStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_trigger_starts_nothing() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.fail_trigger(&k);

        let err = h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap_err();
        assert!(matches!(err, Error::TriggerRejected(_)));
        assert_eq!(h.notifier.messages(), vec![TRIGGER_FAILED_MESSAGE.to_string()]);
        assert_eq!(h.tracker.active_count().await, 0);
        assert!(h.tracker.job_view(&k).await.is_none());

        advance(5_000).await;
        assert_eq!(h.gateway.query_count(&k), 0);
    }

    // ========================================================================
    // Loop Properties
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_one_loop() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);

        h.tracker.track(JIRA_5.0, JIRA_5.1, Some("abc".to_string())).await.unwrap();
        h.tracker.track(JIRA_5.0, JIRA_5.1, Some("abc".to_string())).await.unwrap();
        assert_eq!(h.tracker.active_count().await, 1);

        // Queries at 0s, 2s, 4s and 6s from a single loop
        advance(6_500).await;
        assert_eq!(h.gateway.query_count(&k), 4);

        h.tracker.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);
        h.tracker.track(JIRA_5.0, JIRA_5.1, None).await.unwrap();

        assert!(h.tracker.stop(JIRA_5.0, JIRA_5.1).await);
        assert!(!h.tracker.stop(JIRA_5.0, JIRA_5.1).await);
        assert!(!h.tracker.is_polling(&k).await);
        assert!(!h.tracker.job_view(&k).await.unwrap().is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_stops_polling() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.fail_status(&k);

        h.tracker.track(JIRA_5.0, JIRA_5.1, Some("abc".to_string())).await.unwrap();
        h.tracker.wait_idle().await;

        advance(10_000).await;
        assert_eq!(h.gateway.query_count(&k), 1);
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 0);
        assert!(h.notifier.messages().is_empty());
        assert!(!h.tracker.job_view(&k).await.unwrap().is_polling);
        assert_eq!(
            h.tracker.entity(&k).await.unwrap().sync_status,
            SyncStatus::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_query_discards_response() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.set_latency(Duration::from_secs(1));
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"succeeded","job_id":"abc"}"#)]);

        h.tracker.track(JIRA_5.0, JIRA_5.1, Some("abc".to_string())).await.unwrap();
        advance(500).await;
        assert!(h.tracker.stop(JIRA_5.0, JIRA_5.1).await);

        advance(5_000).await;
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 0);
        assert_eq!(
            h.tracker.entity(&k).await.unwrap().sync_status,
            SyncStatus::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_scheduled_polls() {
        let h = harness(vec![jira("5"), jira("6")]).await;
        let k5 = key(SyncKind::Jira, "5");
        let k6 = key(SyncKind::Jira, "6");
        for k in [&k5, &k6] {
            h.gateway
                .script_statuses(k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);
        }
        h.tracker.track(SyncKind::Jira, "5", None).await.unwrap();
        h.tracker.track(SyncKind::Jira, "6", None).await.unwrap();
        advance(100).await;

        assert_eq!(h.tracker.teardown().await, 2);
        let revision = *h.tracker.subscribe().borrow();
        let before = h.tracker.entities(SyncKind::Jira).await;

        advance(10_000).await;
        assert_eq!(h.gateway.query_count(&k5), 1);
        assert_eq!(h.gateway.query_count(&k6), 1);
        assert_eq!(*h.tracker.subscribe().borrow(), revision);
        assert_eq!(h.tracker.entities(SyncKind::Jira).await, before);
        assert_eq!(h.tracker.teardown().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_teardown_fail() {
        let h = harness(vec![jira("5")]).await;
        h.tracker.teardown().await;

        assert!(h.tracker.is_closed());
        assert!(matches!(
            h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await,
            Err(Error::TrackerClosed)
        ));
        assert!(matches!(
            h.tracker.track(JIRA_5.0, JIRA_5.1, None).await,
            Err(Error::TrackerClosed)
        ));
        assert!(matches!(h.tracker.mount_resume().await, Err(Error::TrackerClosed)));
        assert_eq!(h.gateway.trigger_count(&key(JIRA_5.0, JIRA_5.1)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_id_is_rejected() {
        let h = harness(vec![jira("5")]).await;

        assert!(matches!(
            h.tracker.trigger_sync(SyncKind::Jira, " ").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.tracker.track(SyncKind::Jira, "", None).await,
            Err(Error::Validation(_))
        ));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_loops() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);
        h.tracker.track(JIRA_5.0, JIRA_5.1, None).await.unwrap();
        advance(100).await;

        let Harness { gateway, tracker, .. } = h;
        drop(tracker);

        advance(10_000).await;
        assert_eq!(gateway.query_count(&k), 1);
    }

    // ========================================================================
    // Resumption
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_mount_resumes_in_flight_job_without_trigger() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_collection(
            SyncKind::Jira,
            vec![in_flight(jira("9"), "J9"), jira("10")],
        );
        let k = key(SyncKind::Jira, "9");
        gateway.script_statuses(&k, vec![status(r#"{"status":"running","job_id":"J9"}"#)]);

        let tracker = SyncTracker::with_defaults(gateway.clone());
        assert_eq!(tracker.mount_resume().await.unwrap(), 1);

        assert_eq!(tracker.active_keys().await, vec![k.clone()]);
        assert_eq!(
            tracker.job_view(&k).await.unwrap().job_id.as_deref(),
            Some("J9")
        );
        assert_eq!(gateway.trigger_count(&k), 0);
        for kind in SyncKind::ALL {
            assert_eq!(gateway.reload_count(kind), 1);
        }

        // Already tracked: a second mount starts nothing new
        assert_eq!(tracker.mount_resume().await.unwrap(), 0);
        assert_eq!(tracker.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_loop_follows_newer_job() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_collection(SyncKind::Jira, vec![in_flight(jira("9"), "J9")]);
        let k = key(SyncKind::Jira, "9");
        gateway.script_statuses(&k, vec![status(r#"{"status":"running","job_id":"J10"}"#)]);

        let tracker = SyncTracker::with_defaults(gateway.clone());
        tracker.mount_resume().await.unwrap();

        // J9 at 0s, then J10 at 0s, 2s and 4s
        advance(4_500).await;
        assert_eq!(gateway.query_count(&k), 4);
        assert_eq!(gateway.reload_count(SyncKind::Jira), 1);
        assert_eq!(tracker.active_keys().await, vec![k.clone()]);

        let view = tracker.job_view(&k).await.unwrap();
        assert_eq!(view.job_id.as_deref(), Some("J10"));
        assert!(view.is_polling);
        assert_eq!(
            tracker.entity(&k).await.unwrap().current_job_id.as_deref(),
            Some("J10")
        );

        tracker.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handed_over_job_failure_notifies_once() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_collection(SyncKind::Jira, vec![in_flight(jira("9"), "J9")]);
        let k = key(SyncKind::Jira, "9");
        gateway.script_statuses(
            &k,
            vec![
                status(r#"{"status":"running","job_id":"J10"}"#),
                status(r#"{"status":"failed","job_id":"J10","job_message":"disk full"}"#),
            ],
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = SyncTracker::new(gateway.clone(), notifier.clone(), TrackerConfig::default());

        tracker.mount_resume().await.unwrap();
        tracker.wait_idle().await;

        assert_eq!(notifier.messages(), vec!["disk full".to_string()]);
        assert_eq!(gateway.query_count(&k), 2);
        assert_eq!(gateway.reload_count(SyncKind::Jira), 2);
        assert_eq!(
            tracker.entity(&k).await.unwrap().sync_status,
            SyncStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_reload_resumes_other_in_flight_jobs() {
        let h = harness(vec![jira("5"), jira("6")]).await;
        let k5 = key(SyncKind::Jira, "5");
        let k6 = key(SyncKind::Jira, "6");
        h.gateway.script_trigger(&k5, queued("abc"));
        h.gateway
            .script_statuses(&k5, vec![status(r#"{"status":"succeeded","job_id":"abc"}"#)]);
        h.gateway
            .script_statuses(&k6, vec![status(r#"{"status":"succeeded","job_id":"J6"}"#)]);

        // Another client started a job on 6 meanwhile
        h.gateway.set_collection(
            SyncKind::Jira,
            vec![jira("5"), in_flight(jira("6"), "J6")],
        );

        h.tracker.trigger_sync(SyncKind::Jira, "5").await.unwrap();
        h.tracker.wait_idle().await;

        assert_eq!(h.gateway.query_count(&k6), 1);
        assert_eq!(h.gateway.reload_count(SyncKind::Jira), 2);
        assert_eq!(
            h.tracker.entity(&k6).await.unwrap().sync_status,
            SyncStatus::Succeeded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_tolerates_partial_failure() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_collection(SyncKind::Jira, vec![jira("1")]);
        gateway.fail_reload(SyncKind::Git);

        let tracker = SyncTracker::with_defaults(gateway.clone());
        assert_eq!(tracker.mount_resume().await.unwrap(), 0);
        assert_eq!(tracker.entities(SyncKind::Jira).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_fails_when_nothing_loads() {
        let gateway = Arc::new(ScriptedGateway::new());
        for kind in SyncKind::ALL {
            gateway.fail_reload(kind);
        }

        let tracker = SyncTracker::with_defaults(gateway);
        assert!(matches!(tracker.mount_resume().await, Err(Error::Api { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_settled_covers_terminal_reload() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.set_latency(Duration::from_secs(1));
        h.gateway.script_trigger(&k, queued("abc"));
        h.gateway.script_statuses(
            &k,
            vec![status(
                r#"{"status":"failed","job_id":"abc","job_message":"auth error"}"#,
            )],
        );

        // Trigger answers at 1s, the query at 2s, the reload at 3s
        h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap();
        let mut renamed = jira("5");
        renamed.sync_interval = "daily".to_string();
        h.gateway.set_collection(SyncKind::Jira, vec![renamed]);

        advance(1_500).await;
        assert!(!h.tracker.is_polling(&k).await);
        assert!(!h.tracker.is_settled().await);

        h.tracker.wait_settled().await;
        assert!(h.tracker.is_settled().await);
        assert_eq!(h.notifier.messages(), vec!["auth error".to_string()]);
        assert_eq!(h.tracker.entity(&k).await.unwrap().sync_interval, "daily");
        assert_eq!(h.tracker.teardown().await, 0);
    }

    // ========================================================================
    // Read Access
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_trigger_records_job_on_entity() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway.script_trigger(&k, queued("abc"));
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);
        h.gateway.set_latency(Duration::from_secs(1));

        h.tracker.trigger_sync(JIRA_5.0, JIRA_5.1).await.unwrap();

        let entity = h.tracker.entity(&k).await.unwrap();
        assert_eq!(entity.current_job_id.as_deref(), Some("abc"));
        assert_eq!(entity.sync_status, SyncStatus::Queued);

        let view = h.tracker.job_view(&k).await.unwrap();
        assert_eq!(view.job_status, Some(SyncStatus::Queued));
        assert_eq!(view.job_message.as_deref(), Some("Sync job queued."));
        assert!(view.is_polling);

        h.tracker.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_ticks_on_changes() {
        let h = harness(vec![jira("5")]).await;
        let k = key(JIRA_5.0, JIRA_5.1);
        h.gateway
            .script_statuses(&k, vec![status(r#"{"status":"running","job_id":"abc"}"#)]);

        let mut changes = h.tracker.subscribe();
        h.tracker.track(JIRA_5.0, JIRA_5.1, None).await.unwrap();
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        advance(100).await;
        assert!(changes.has_changed().unwrap());

        h.tracker.teardown().await;
    }
}
