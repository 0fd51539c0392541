//! Sync commands
//!
//! List sync targets, query one, or run and follow jobs until the backend
//! reports them done.

use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Result};
use botsync_core::{
    Error, JobKey, JobViewState, StatusResponse, SyncEntity, SyncKind, SyncStatus, SyncTracker,
    TriggerGateway,
};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{
    display_opt, print_json_line, print_output, print_info, print_single, print_success,
    truncate, OutputFormat,
};
use super::Context;

#[derive(Subcommand)]
pub enum SyncAction {
    /// List configured sync targets
    List {
        /// Only list one kind (jira, confluence, git)
        #[arg(short, long)]
        kind: Option<SyncKind>,
    },

    /// Show the backend status of one target
    Status {
        /// Target kind (jira, confluence, git)
        kind: SyncKind,

        /// Target id
        id: String,
    },

    /// Run a sync now and follow its job until it finishes
    Run {
        /// Target kind (jira, confluence, git)
        kind: SyncKind,

        /// Target id
        id: String,
    },

    /// Follow jobs that are already in flight
    Watch {
        /// Only follow one target of this kind
        #[arg(requires = "id")]
        kind: Option<SyncKind>,

        /// Target id
        id: Option<String>,
    },
}

/// Sync target row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct SyncTargetRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Interval")]
    pub interval: String,
    #[tabled(rename = "Last Sync")]
    pub last_sync: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Job")]
    pub job_id: String,
    #[tabled(rename = "Job Status")]
    pub job_status: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<&SyncEntity> for SyncTargetRow {
    fn from(entity: &SyncEntity) -> Self {
        Self {
            kind: entity.kind().to_string(),
            id: entity.id.clone(),
            target: entity.target.describe(),
            interval: entity.sync_interval.clone(),
            last_sync: entity
                .last_sync_time
                .map(|t| {
                    t.with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                })
                .unwrap_or_else(|| "-".to_string()),
            status: entity.sync_status.to_string(),
            job_id: display_opt(entity.current_job_id.as_deref()),
            job_status: display_opt(entity.job_status.map(|s| s.as_str())),
            message: truncate(
                entity
                    .job_message
                    .as_deref()
                    .or(entity.sync_status_message.as_deref())
                    .unwrap_or("-"),
                60,
            ),
        }
    }
}

/// Status of one target for table display
#[derive(Debug, Serialize, Tabled)]
pub struct StatusRow {
    #[tabled(rename = "Target")]
    pub key: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Job")]
    pub job_id: String,
    #[tabled(rename = "Job Status")]
    pub job_status: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl StatusRow {
    fn new(key: &JobKey, response: &StatusResponse) -> Self {
        Self {
            key: key.to_string(),
            status: display_opt(response.status.map(|s| s.as_str())),
            job_id: display_opt(response.job_id.as_deref()),
            job_status: display_opt(response.job_status.map(|s| s.as_str())),
            message: display_opt(response.effective_job_message()),
        }
    }
}

/// One observed change of a tracked job
#[derive(Debug, Serialize)]
struct JobEvent<'a> {
    key: String,
    #[serde(flatten)]
    view: &'a JobViewState,
}

pub async fn execute(ctx: &Context, action: SyncAction) -> Result<()> {
    match action {
        SyncAction::List { kind } => list_targets(ctx, kind).await,
        SyncAction::Status { kind, id } => show_status(ctx, kind, id).await,
        SyncAction::Run { kind, id } => run_sync(ctx, kind, id).await,
        SyncAction::Watch { kind, id } => match (kind, id) {
            (Some(kind), Some(id)) => watch_one(ctx, kind, id).await,
            _ => watch_all(ctx).await,
        },
    }
}

async fn list_targets(ctx: &Context, kind: Option<SyncKind>) -> Result<()> {
    let gateway = ctx.gateway()?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => SyncKind::ALL.to_vec(),
    };

    let mut rows = Vec::new();
    for kind in kinds {
        let entities = gateway.reload_all(kind).await?;
        rows.extend(entities.iter().map(SyncTargetRow::from));
    }

    print_output(&rows, ctx.format)?;
    Ok(())
}

async fn show_status(ctx: &Context, kind: SyncKind, id: String) -> Result<()> {
    let gateway = ctx.gateway()?;
    let response = gateway.query_status(kind, &id).await?;
    print_single(&StatusRow::new(&JobKey::new(kind, id), &response), ctx.format)?;
    Ok(())
}

async fn run_sync(ctx: &Context, kind: SyncKind, id: String) -> Result<()> {
    let tracker = ctx.sync_tracker()?;
    let key = JobKey::new(kind, id.clone());

    let job_id = match tracker.trigger_sync(kind, &id).await {
        Ok(job_id) => job_id,
        // The notifier already told the user
        Err(Error::TriggerRejected(reason)) => bail!("Could not queue sync for {}: {}", key, reason),
        Err(e) => return Err(e.into()),
    };
    print_info(&format!("Queued job {} for {}", job_id, key), ctx.quiet);

    let interrupted = follow(ctx, &tracker, Some(&key)).await?;
    if !interrupted {
        // Let the terminal reload and its notification land first
        tracker.wait_settled().await;
    }
    tracker.teardown().await;
    if interrupted {
        bail!("Interrupted while following {}", key);
    }

    let view = tracker.job_view(&key).await.unwrap_or_default();
    match view.job_status {
        _ if view.job_id.as_deref().is_some_and(|j| j != job_id) => {
            print_info(
                &format!(
                    "Job {} was superseded by job {}",
                    job_id,
                    display_opt(view.job_id.as_deref())
                ),
                ctx.quiet,
            );
            Ok(())
        }
        Some(SyncStatus::Succeeded) => {
            print_success(&format!("Sync of {} succeeded", key), ctx.quiet);
            Ok(())
        }
        Some(SyncStatus::Failed) => bail!("Sync of {} failed", key),
        _ => bail!("Stopped following {}: status could not be read", key),
    }
}

async fn watch_one(ctx: &Context, kind: SyncKind, id: String) -> Result<()> {
    let tracker = ctx.sync_tracker()?;
    let key = JobKey::new(kind, id);

    tracker.reload(kind).await?;
    if !tracker.is_polling(&key).await {
        match tracker.entity(&key).await {
            Some(entity) => print_info(
                &format!("No job in flight for {} (status: {})", key, entity.sync_status),
                ctx.quiet,
            ),
            None => bail!("Sync target not found: {}", key),
        }
        return Ok(());
    }

    let interrupted = follow(ctx, &tracker, Some(&key)).await?;
    if !interrupted {
        // Let the terminal reload and its notification land first
        tracker.wait_settled().await;
    }
    tracker.teardown().await;
    if interrupted {
        bail!("Interrupted while following {}", key);
    }
    Ok(())
}

async fn watch_all(ctx: &Context) -> Result<()> {
    let tracker = ctx.sync_tracker()?;

    let resumed = tracker.mount_resume().await?;
    if resumed == 0 {
        print_info("No sync jobs in flight.", ctx.quiet);
        return Ok(());
    }
    print_info(&format!("Following {} job(s)...", resumed), ctx.quiet);

    let interrupted = follow(ctx, &tracker, None).await?;
    tracker.teardown().await;
    if interrupted {
        bail!("Interrupted");
    }
    print_success("All followed jobs finished.", ctx.quiet);
    Ok(())
}

/// Print job changes until `only` (or every loop) stops. Returns `true`
/// when interrupted with Ctrl-C.
async fn follow(ctx: &Context, tracker: &SyncTracker, only: Option<&JobKey>) -> Result<bool> {
    let mut changes = tracker.subscribe();
    let mut seen: BTreeSet<JobKey> = only.into_iter().cloned().collect();
    let mut printed: HashMap<JobKey, JobViewState> = HashMap::new();

    loop {
        if only.is_none() {
            seen.extend(tracker.active_keys().await);
        }
        for key in &seen {
            let Some(view) = tracker.job_view(key).await else {
                continue;
            };
            if printed.get(key) != Some(&view) {
                print_event(ctx, key, &view)?;
                printed.insert(key.clone(), view);
            }
        }

        let done = match only {
            Some(key) => !tracker.is_polling(key).await,
            None => tracker.is_idle().await,
        };
        if done {
            return Ok(false);
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let stopped = tracker.teardown().await;
                print_info(&format!("Stopped {} loop(s).", stopped), ctx.quiet);
                return Ok(true);
            }
        }
    }
}

fn print_event(ctx: &Context, key: &JobKey, view: &JobViewState) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => print_json_line(&JobEvent {
            key: key.to_string(),
            view,
        }),
        OutputFormat::Table => {
            let indicator = if view.is_polling { "checking status…" } else { "done" };
            print_info(
                &format!(
                    "{:<14} job {:<12} {:<10} {} [{}]",
                    key.to_string(),
                    display_opt(view.job_id.as_deref()),
                    display_opt(view.job_status.map(|s| s.as_str())),
                    view.job_message.as_deref().unwrap_or(""),
                    indicator
                ),
                ctx.quiet,
            );
            Ok(())
        }
    }
}
