//! Data models for sync targets and the backend's job payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Sync Kind
// ============================================================================

/// Kind of sync target configured for a chatbot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Jira,
    Confluence,
    Git,
}

impl SyncKind {
    /// All kinds, in the order the console lists them
    pub const ALL: [SyncKind; 3] = [SyncKind::Jira, SyncKind::Confluence, SyncKind::Git];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Jira => "jira",
            SyncKind::Confluence => "confluence",
            SyncKind::Git => "git",
        }
    }

    /// Backend collection name under `/chatBots/{id}/`
    pub fn resource(&self) -> &'static str {
        match self {
            SyncKind::Jira => "jiraSyncs",
            SyncKind::Confluence => "confluenceSyncs",
            SyncKind::Git => "gitRepoSyncs",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jira" => Ok(SyncKind::Jira),
            "confluence" => Ok(SyncKind::Confluence),
            "git" | "github" => Ok(SyncKind::Git),
            _ => Err(format!(
                "Invalid sync kind: {}. Use 'jira', 'confluence' or 'git'",
                s
            )),
        }
    }
}

// ============================================================================
// Sync Status
// ============================================================================

/// Coarse status reported for a target or a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Anything the backend sends that this client does not know about
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Queued => "queued",
            SyncStatus::Running => "running",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Failed => "failed",
            SyncStatus::Unknown => "unknown",
        }
    }

    /// `succeeded` or `failed`: no further polling happens for the job
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Succeeded | SyncStatus::Failed)
    }

    /// `queued` or `running`
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncStatus::Queued | SyncStatus::Running)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Infallible;

    /// Unrecognised values parse as [`SyncStatus::Unknown`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "idle" => SyncStatus::Idle,
            "queued" => SyncStatus::Queued,
            "running" => SyncStatus::Running,
            "succeeded" => SyncStatus::Succeeded,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::Unknown,
        })
    }
}

// ============================================================================
// Sync Entity
// ============================================================================

/// Kind-specific configuration of a sync target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SyncTarget {
    Jira { board_url: String },
    Confluence { space_url: String },
    Git { repo_full_name: String, branch: String },
}

impl SyncTarget {
    pub fn kind(&self) -> SyncKind {
        match self {
            SyncTarget::Jira { .. } => SyncKind::Jira,
            SyncTarget::Confluence { .. } => SyncKind::Confluence,
            SyncTarget::Git { .. } => SyncKind::Git,
        }
    }

    /// One-line description for listings
    pub fn describe(&self) -> String {
        match self {
            SyncTarget::Jira { board_url } => board_url.clone(),
            SyncTarget::Confluence { space_url } => space_url.clone(),
            SyncTarget::Git {
                repo_full_name,
                branch,
            } => format!("{}@{}", repo_full_name, branch),
        }
    }
}

/// A configured sync target as last known from the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEntity {
    pub id: String,
    pub target: SyncTarget,
    pub credential_id: Option<String>,
    pub sync_interval: String,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub sync_status_message: Option<String>,
    /// Most recently triggered job for this target
    pub current_job_id: Option<String>,
    /// Status and message of `current_job_id`, not of the target
    pub job_status: Option<SyncStatus>,
    pub job_message: Option<String>,
}

impl SyncEntity {
    /// Create an idle entity with no job history
    pub fn new(id: impl Into<String>, target: SyncTarget) -> Self {
        Self {
            id: id.into(),
            target,
            credential_id: None,
            sync_interval: DEFAULT_SYNC_INTERVAL.to_string(),
            last_sync_time: None,
            sync_status: SyncStatus::Idle,
            sync_status_message: None,
            current_job_id: None,
            job_status: None,
            job_message: None,
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.target.kind()
    }

    /// Whether this entity carries a job the backend is still working on.
    ///
    /// Requires both a job id and an in-flight status; stale rows with only
    /// one of the two are not considered in flight.
    pub fn has_in_flight_job(&self) -> bool {
        self.current_job_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
            && self.sync_status.is_in_flight()
    }

    /// Build an entity from a backend record of the given kind
    pub fn from_record(kind: SyncKind, record: SyncEntityRecord) -> Self {
        let target = match kind {
            SyncKind::Jira => SyncTarget::Jira {
                board_url: record.board_url.unwrap_or_default(),
            },
            SyncKind::Confluence => SyncTarget::Confluence {
                space_url: record.space_url.unwrap_or_default(),
            },
            SyncKind::Git => SyncTarget::Git {
                repo_full_name: record.repo_full_name.unwrap_or_default(),
                branch: record
                    .branch
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| DEFAULT_GIT_BRANCH.to_string()),
            },
        };

        Self {
            id: record.id.0,
            target,
            credential_id: record.credential_id.map(|id| id.0),
            sync_interval: record
                .sync_interval
                .unwrap_or_else(|| DEFAULT_SYNC_INTERVAL.to_string()),
            last_sync_time: record.last_sync_time,
            sync_status: record.sync_status.unwrap_or_default(),
            sync_status_message: record.sync_status_message,
            current_job_id: record.current_job_id.map(|id| id.0).filter(|id| !id.is_empty()),
            job_status: record.job_status,
            job_message: record.job_message,
        }
    }
}

/// Default schedule for a newly configured target
pub const DEFAULT_SYNC_INTERVAL: &str = "manual";

/// Branch assumed for Git targets that do not name one
pub const DEFAULT_GIT_BRANCH: &str = "main";

// ============================================================================
// Wire Types
// ============================================================================

/// Identifier that the backend may send either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueId(pub String);

impl<'de> Deserialize<'de> for OpaqueId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => OpaqueId(n.to_string()),
            Raw::Str(s) => OpaqueId(s),
        })
    }
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    OpaqueId::deserialize(deserializer).map(|id| id.0)
}

fn opaque_id_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<OpaqueId>::deserialize(deserializer).map(|id| id.map(|id| id.0))
}

/// Sync configuration row as returned by the collection endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SyncEntityRecord {
    pub id: OpaqueId,
    #[serde(default)]
    pub board_url: Option<String>,
    #[serde(default)]
    pub space_url: Option<String>,
    #[serde(default)]
    pub repo_full_name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub credential_id: Option<OpaqueId>,
    #[serde(default)]
    pub sync_interval: Option<String>,
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub sync_status_message: Option<String>,
    #[serde(default)]
    pub current_job_id: Option<OpaqueId>,
    #[serde(default)]
    pub job_status: Option<SyncStatus>,
    #[serde(default)]
    pub job_message: Option<String>,
}

/// Answer to a "sync now" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub status: Option<SyncStatus>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(deserialize_with = "opaque_id")]
    pub job_id: String,
}

/// Answer to a status query for one target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<SyncStatus>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "opaque_id_opt")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_status: Option<SyncStatus>,
    #[serde(default)]
    pub job_message: Option<String>,
}

impl StatusResponse {
    /// Job status when reported, otherwise the target status
    pub fn effective_job_status(&self) -> Option<SyncStatus> {
        self.job_status.or(self.status)
    }

    /// Job message when reported, otherwise the target message
    pub fn effective_job_message(&self) -> Option<&str> {
        self.job_message.as_deref().or(self.message.as_deref())
    }
}
