//! Job identity
//!
//! A `JobKey` names a sync target, not a single job run: every trigger on
//! the same target produces a new job id under the same key.

use serde::Serialize;
use std::fmt;

use crate::models::SyncKind;

/// Stable identity of a tracked target: (kind, entity id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    kind: SyncKind,
    id: String,
}

impl JobKey {
    pub fn new(kind: SyncKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Renders as `{kind}-{id}`, e.g. `jira-5`
impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// Key for the given target
pub fn key_of(kind: SyncKind, id: &str) -> JobKey {
    JobKey::new(kind, id)
}
