//! Sync entity store
//!
//! Last known sync configurations per kind, in backend order. Status fields
//! are written only by the reconciler, by trigger bookkeeping and by full
//! reloads.

use std::collections::BTreeMap;

use crate::models::{SyncEntity, SyncKind};

use super::key::JobKey;

#[derive(Debug, Clone, Default)]
pub struct SyncEntityStore {
    collections: BTreeMap<SyncKind, Vec<SyncEntity>>,
}

impl SyncEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection for `kind`.
    ///
    /// Entities of another kind are dropped with a warning.
    pub fn replace(&mut self, kind: SyncKind, entities: Vec<SyncEntity>) {
        let (matching, other): (Vec<_>, Vec<_>) =
            entities.into_iter().partition(|entity| entity.kind() == kind);
        if !other.is_empty() {
            log::warn!(
                "Ignoring {} entities of another kind in {} reload",
                other.len(),
                kind
            );
        }
        self.collections.insert(kind, matching);
    }

    /// Entities of `kind`, in the order the backend returned them
    pub fn list(&self, kind: SyncKind) -> &[SyncEntity] {
        self.collections
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, key: &JobKey) -> Option<&SyncEntity> {
        self.list(key.kind())
            .iter()
            .find(|entity| entity.id == key.id())
    }

    /// Apply `f` to the entity for `key`. Returns `false` if it is unknown.
    pub fn update<F>(&mut self, key: &JobKey, f: F) -> bool
    where
        F: FnOnce(&mut SyncEntity),
    {
        let entity = self
            .collections
            .get_mut(&key.kind())
            .and_then(|entities| entities.iter_mut().find(|entity| entity.id == key.id()));

        match entity {
            Some(entity) => {
                f(entity);
                true
            }
            None => false,
        }
    }

    /// Targets of `kind` carrying a job the backend is still working on,
    /// paired with that job id
    pub fn in_flight(&self, kind: SyncKind) -> Vec<(JobKey, String)> {
        self.list(kind)
            .iter()
            .filter(|entity| entity.has_in_flight_job())
            .filter_map(|entity| {
                entity
                    .current_job_id
                    .clone()
                    .map(|job_id| (JobKey::new(kind, entity.id.clone()), job_id))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
