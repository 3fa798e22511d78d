//! Intent watcher lifecycle service.
//!
//! Advances watcher state machines as rediffs shrink their diff sets or
//! the entity moves on to a newer spec version, records handler failures,
//! and prunes terminal watchers after the retention grace period.

use chrono::Utc;
use tracing::{debug, info};

use converge_core::{Diff, Entity, IntentWatcher, IntentWatcherStatus};
use converge_storage::IntentWatcherStore;

use crate::error::EngineResult;
use crate::stores::EntityStores;

/// Service advancing persisted watchers.
#[derive(Clone)]
pub struct WatcherService {
    stores: EntityStores,
}

impl WatcherService {
    /// Create the service over a store bundle.
    #[must_use]
    pub fn new(stores: EntityStores) -> Self {
        Self { stores }
    }

    /// Advance every live watcher of an entity against freshly computed
    /// diffs.
    ///
    /// A watcher's diffs only ever shrink: the new set is the structural
    /// intersection of its current set with the fresh diffs. Processing is
    /// idempotent, so replaying the same fresh diffs changes nothing.
    pub async fn advance_for_entity(
        &self,
        entity: &Entity,
        fresh_diffs: &[Diff],
    ) -> EngineResult<()> {
        let current_version = entity.metadata.spec_version;
        let watchers = self.stores.watchers.list_watchers().await?;

        for mut watcher in watchers {
            if watcher.entity_ref.uuid != entity.metadata.uuid || watcher.status.is_terminal() {
                continue;
            }
            self.advance(&mut watcher, current_version, fresh_diffs);
            self.stores.watchers.update_watcher(watcher).await?;
        }
        Ok(())
    }

    fn advance(&self, watcher: &mut IntentWatcher, current_version: i64, fresh_diffs: &[Diff]) {
        let before = watcher.diffs.len();
        let intersection: Vec<Diff> = watcher
            .diffs
            .iter()
            .filter(|known| fresh_diffs.iter().any(|fresh| fresh.matches(known)))
            .cloned()
            .collect();

        if watcher.spec_version >= current_version {
            // Live watcher: adopt it and shrink its diffs.
            if intersection.is_empty() {
                watcher.diffs.clear();
                watcher.transition(IntentWatcherStatus::CompletedSuccessfully);
                info!(watcher = %watcher.uuid, "Watcher completed successfully");
            } else {
                watcher.diffs = intersection;
                watcher.transition(IntentWatcherStatus::Active);
            }
        } else {
            // Superseded by a newer spec version.
            if intersection.is_empty() {
                watcher.diffs.clear();
                watcher.transition(IntentWatcherStatus::CompletedSuccessfully);
            } else if intersection.len() < before {
                watcher.diffs = intersection;
                watcher.transition(IntentWatcherStatus::CompletedPartially);
            } else {
                watcher.transition(IntentWatcherStatus::Outdated);
            }
            debug!(
                watcher = %watcher.uuid,
                status = watcher.status.as_str(),
                "Superseded watcher resolved"
            );
        }
    }

    /// Record a failed handler invocation or liveness probe on every live
    /// watcher holding the diff. Returns the highest failure count seen,
    /// which the resolver feeds into its backoff schedule.
    pub async fn record_handler_failure(
        &self,
        entity_uuid: uuid::Uuid,
        diff: &Diff,
        error: &str,
    ) -> EngineResult<u32> {
        let watchers = self.stores.watchers.list_watchers().await?;
        let mut max_failures = 1;

        for mut watcher in watchers {
            if watcher.entity_ref.uuid != entity_uuid || watcher.status.is_terminal() {
                continue;
            }
            if !watcher.diffs.iter().any(|known| known.matches(diff)) {
                continue;
            }
            watcher.record_handler_failure(error);
            max_failures = max_failures.max(watcher.times_failed);
            self.stores.watchers.update_watcher(watcher).await?;
        }
        Ok(max_failures)
    }

    /// Delete terminal watchers whose last status change is older than the
    /// grace period. Returns how many were pruned.
    pub async fn prune_expired(&self, grace_seconds: u64) -> EngineResult<usize> {
        let now = Utc::now();
        let watchers = self.stores.watchers.list_watchers().await?;
        let mut pruned = 0;

        for watcher in watchers {
            if watcher.expired(grace_seconds, now) {
                self.stores.watchers.delete_watcher(watcher.uuid).await?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!(count = pruned, "Pruned expired watchers");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{EntityRef, IntentfulSignature, Metadata};
    use converge_storage::IntentWatcherStore;
    use serde_json::{json, Map};
    use uuid::Uuid;

    fn diff(signature: &str, spec: i64, status: i64) -> Diff {
        Diff::new(
            "cluster",
            IntentfulSignature::new(
                signature,
                format!("http://provider/{signature}"),
                "http://provider",
            ),
            vec![converge_sfs::DiffContent {
                keys: Map::new(),
                key: signature.to_string(),
                spec_val: vec![json!(spec)],
                status_val: vec![json!(status)],
            }],
        )
    }

    fn entity(version: i64) -> Entity {
        let mut metadata = Metadata::new("cluster", "infra", "v1");
        metadata.spec_version = version;
        Entity {
            metadata,
            spec: json!({}),
            status: json!({}),
        }
    }

    fn watcher_for(entity: &Entity, version: i64, diffs: Vec<Diff>) -> IntentWatcher {
        IntentWatcher::new(entity.entity_ref(), version, diffs)
    }

    async fn saved(service: &WatcherService, watcher: &IntentWatcher) -> IntentWatcher {
        service.stores.watchers.get_watcher(watcher.uuid).await.unwrap()
    }

    fn service() -> WatcherService {
        WatcherService::new(EntityStores::in_memory())
    }

    #[tokio::test]
    async fn test_live_watcher_completes_when_diffs_resolve() {
        let service = service();
        let entity = entity(1);
        let watcher = watcher_for(&entity, 1, vec![diff("x", 1, 2)]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service.advance_for_entity(&entity, &[]).await.unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::CompletedSuccessfully);
        assert!(updated.diffs.is_empty());
    }

    #[tokio::test]
    async fn test_live_watcher_shrinks_and_stays_active() {
        let service = service();
        let entity = entity(1);
        let remaining = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![remaining.clone(), diff("y", 3, 4)]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service
            .advance_for_entity(&entity, &[remaining.clone()])
            .await
            .unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::Active);
        assert_eq!(updated.diffs.len(), 1);
        assert!(updated.diffs[0].matches(&remaining));
    }

    #[tokio::test]
    async fn test_rediff_never_grows_diffs() {
        let service = service();
        let entity = entity(1);
        let known = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![known.clone()]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        // Fresh diffs carry an extra discrepancy the watcher never held.
        service
            .advance_for_entity(&entity, &[known.clone(), diff("z", 9, 8)])
            .await
            .unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.diffs.len(), 1);
        assert!(updated.diffs[0].matches(&known));
    }

    #[tokio::test]
    async fn test_superseded_watcher_with_partial_progress() {
        let service = service();
        let entity = entity(2);
        let remaining = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![remaining.clone(), diff("y", 3, 4)]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service
            .advance_for_entity(&entity, &[remaining])
            .await
            .unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::CompletedPartially);
    }

    #[tokio::test]
    async fn test_superseded_watcher_with_no_progress_is_outdated() {
        let service = service();
        let entity = entity(2);
        let stuck = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![stuck.clone()]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service.advance_for_entity(&entity, &[stuck]).await.unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::Outdated);
    }

    #[tokio::test]
    async fn test_superseded_watcher_fully_resolved_completes() {
        let service = service();
        let entity = entity(3);
        let watcher = watcher_for(&entity, 1, vec![diff("x", 1, 2)]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service.advance_for_entity(&entity, &[]).await.unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::CompletedSuccessfully);
    }

    #[tokio::test]
    async fn test_pending_watcher_promoted_to_active() {
        let service = service();
        let entity = entity(1);
        let outstanding = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![outstanding.clone()]);
        assert_eq!(watcher.status, IntentWatcherStatus::Pending);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service
            .advance_for_entity(&entity, &[outstanding])
            .await
            .unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.status, IntentWatcherStatus::Active);
    }

    #[tokio::test]
    async fn test_handler_failure_recorded_on_owning_watcher() {
        let service = service();
        let entity = entity(1);
        let failing = diff("x", 1, 2);
        let watcher = watcher_for(&entity, 1, vec![failing.clone()]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        let failures = service
            .record_handler_failure(entity.metadata.uuid, &failing, "connection refused")
            .await
            .unwrap();
        assert_eq!(failures, 1);

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.times_failed, 1);
        assert_eq!(
            updated.last_handler_error.as_deref(),
            Some("connection refused")
        );
        // Failures alone never change the lifecycle state.
        assert_eq!(updated.status, IntentWatcherStatus::Pending);
    }

    #[tokio::test]
    async fn test_unrelated_watcher_untouched_by_failure() {
        let service = service();
        let entity = entity(1);
        let watcher = watcher_for(&entity, 1, vec![diff("y", 3, 4)]);
        service.stores.watchers.save_watcher(watcher.clone()).await.unwrap();

        service
            .record_handler_failure(entity.metadata.uuid, &diff("x", 1, 2), "boom")
            .await
            .unwrap();

        let updated = saved(&service, &watcher).await;
        assert_eq!(updated.times_failed, 0);
    }

    #[tokio::test]
    async fn test_prune_deletes_only_expired_terminal_watchers() {
        let service = service();
        let entity = entity(1);

        let mut done = watcher_for(&entity, 1, vec![]);
        done.transition(IntentWatcherStatus::CompletedSuccessfully);
        done.last_status_changed = Utc::now() - chrono::Duration::seconds(3600);
        let live = watcher_for(&entity, 1, vec![diff("x", 1, 2)]);

        service.stores.watchers.save_watcher(done.clone()).await.unwrap();
        service.stores.watchers.save_watcher(live.clone()).await.unwrap();

        let pruned = service.prune_expired(600).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(service.stores.watchers.get_watcher(done.uuid).await.is_err());
        assert!(service.stores.watchers.get_watcher(live.uuid).await.is_ok());
    }
}
