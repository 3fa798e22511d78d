//! In-memory reference store.
//!
//! Implements every storage interface over one shared state behind a
//! `tokio::sync::RwLock`. Used by tests and single-process deployments;
//! persistent backends implement the same traits elsewhere.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use tokio::sync::RwLock;
use uuid::Uuid;

use converge_core::{
    ConvergeError, Entity, EntityRef, IntentWatcher, Metadata, Result, Spec, Status, Watchlist,
};

use crate::traits::{
    GraveyardStore, IntentWatcherStore, SpecStore, StatusStore, WatchlistStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    specs: HashMap<Uuid, (Metadata, Spec)>,
    statuses: HashMap<Uuid, Status>,
    watchlist: Watchlist,
    watchers: HashMap<Uuid, IntentWatcher>,
    /// Spec versions consumed by soft-deleted entities.
    graveyard: HashMap<Uuid, Vec<i64>>,
}

/// Shared in-memory store implementing all storage interfaces.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpecStore for MemoryStore {
    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> Result<Metadata> {
        let mut state = self.state.write().await;
        let uuid = metadata.uuid;

        let next_version = match state.specs.get(&uuid) {
            Some((current, existing_spec)) => {
                if metadata.spec_version != current.spec_version {
                    return Err(ConvergeError::Conflict {
                        metadata: current.clone(),
                        existing_spec: existing_spec.clone(),
                        provided_version: metadata.spec_version,
                    });
                }
                current.spec_version + 1
            }
            None => metadata.spec_version + 1,
        };

        if let Some(versions) = state.graveyard.get(&uuid) {
            if versions.contains(&next_version) {
                return Err(ConvergeError::GraveyardConflict {
                    uuid,
                    version: next_version,
                    highest_version: versions.iter().copied().max().unwrap_or(0),
                });
            }
        }

        let mut updated = metadata;
        updated.spec_version = next_version;
        state.specs.insert(uuid, (updated.clone(), spec));
        Ok(updated)
    }

    async fn get_spec(&self, entity_ref: &EntityRef) -> Result<(Metadata, Spec)> {
        let state = self.state.read().await;
        state
            .specs
            .get(&entity_ref.uuid)
            .cloned()
            .ok_or_else(|| ConvergeError::entity_not_found(entity_ref.uuid))
    }

    async fn list_specs(&self, kind: &str) -> Result<Vec<(Metadata, Spec)>> {
        let state = self.state.read().await;
        Ok(state
            .specs
            .values()
            .filter(|(metadata, _)| metadata.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_random_specs(&self, count: usize) -> Result<Vec<(Metadata, Spec)>> {
        let state = self.state.read().await;
        let sampled = state
            .specs
            .values()
            .choose_multiple(&mut rand::thread_rng(), count);
        Ok(sampled.into_iter().cloned().collect())
    }

    async fn delete_spec(&self, entity_ref: &EntityRef) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .specs
            .remove(&entity_ref.uuid)
            .ok_or_else(|| ConvergeError::entity_not_found(entity_ref.uuid))?;
        state.statuses.remove(&entity_ref.uuid);
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn replace_status(&self, entity_ref: &EntityRef, status: Status) -> Result<()> {
        let mut state = self.state.write().await;
        state.statuses.insert(entity_ref.uuid, status);
        Ok(())
    }

    async fn update_status(&self, entity_ref: &EntityRef, patch: Status) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .statuses
            .entry(entity_ref.uuid)
            .or_insert_with(|| serde_json::json!({}));
        merge_status(current, &patch);
        Ok(())
    }

    async fn get_status(&self, entity_ref: &EntityRef) -> Result<Status> {
        let state = self.state.read().await;
        state
            .statuses
            .get(&entity_ref.uuid)
            .cloned()
            .ok_or_else(|| ConvergeError::entity_not_found(entity_ref.uuid))
    }

    async fn list_status(&self, kind: &str) -> Result<Vec<(EntityRef, Status)>> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for (metadata, _) in state.specs.values() {
            if metadata.kind != kind {
                continue;
            }
            if let Some(status) = state.statuses.get(&metadata.uuid) {
                out.push((metadata.entity_ref(), status.clone()));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl WatchlistStore for MemoryStore {
    async fn get_watchlist(&self) -> Result<Watchlist> {
        let state = self.state.read().await;
        Ok(state.watchlist.clone())
    }

    async fn update_watchlist(&self, watchlist: Watchlist) -> Result<()> {
        let mut state = self.state.write().await;
        state.watchlist = watchlist;
        Ok(())
    }
}

#[async_trait]
impl IntentWatcherStore for MemoryStore {
    async fn save_watcher(&self, watcher: IntentWatcher) -> Result<()> {
        let mut state = self.state.write().await;
        state.watchers.insert(watcher.uuid, watcher);
        Ok(())
    }

    async fn get_watcher(&self, uuid: Uuid) -> Result<IntentWatcher> {
        let state = self.state.read().await;
        state
            .watchers
            .get(&uuid)
            .cloned()
            .ok_or_else(|| ConvergeError::watcher_not_found(uuid))
    }

    async fn list_watchers(&self) -> Result<Vec<IntentWatcher>> {
        let state = self.state.read().await;
        Ok(state.watchers.values().cloned().collect())
    }

    async fn update_watcher(&self, watcher: IntentWatcher) -> Result<()> {
        let mut state = self.state.write().await;
        state.watchers.insert(watcher.uuid, watcher);
        Ok(())
    }

    async fn delete_watcher(&self, uuid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.watchers.remove(&uuid);
        Ok(())
    }
}

#[async_trait]
impl GraveyardStore for MemoryStore {
    async fn dispose(&self, entity: Entity) -> Result<()> {
        let mut state = self.state.write().await;
        let uuid = entity.metadata.uuid;
        let versions = state.graveyard.entry(uuid).or_default();
        for version in 1..=entity.metadata.spec_version {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
        Ok(())
    }

    async fn check_spec_version_exists(
        &self,
        entity_ref: &EntityRef,
        version: i64,
    ) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .graveyard
            .get(&entity_ref.uuid)
            .is_some_and(|versions| versions.contains(&version)))
    }

    async fn get_highest_spec_version(&self, entity_ref: &EntityRef) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .graveyard
            .get(&entity_ref.uuid)
            .and_then(|versions| versions.iter().copied().max())
            .unwrap_or(0))
    }
}

/// Deep partial merge: objects merge recursively, `null` leaves unset the
/// field, everything else replaces.
pub fn merge_status(base: &mut Status, patch: &Status) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, patch_val) in patch_map {
                if patch_val.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_val) if base_val.is_object() && patch_val.is_object() => {
                        merge_status(base_val, patch_val);
                    }
                    Some(base_val) => *base_val = patch_val.clone(),
                    None => {
                        base_map.insert(key.clone(), patch_val.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
