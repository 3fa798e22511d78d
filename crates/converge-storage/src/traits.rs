//! Storage interfaces.
//!
//! Narrow, technology-agnostic traits the engine consumes. Every write
//! operation is an idempotent upsert or a compare-and-swap, so several
//! resolver processes can safely race on one backing store.

use async_trait::async_trait;
use uuid::Uuid;

use converge_core::{
    Entity, EntityRef, IntentWatcher, Metadata, Result, Spec, Status, Watchlist,
};

/// Desired-state document store.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Compare-and-swap spec write.
    ///
    /// The caller presents the metadata it read; the write succeeds only
    /// when its `spec_version` still matches the version on record, and
    /// the store increments the version atomically. A stale version
    /// yields `ConvergeError::Conflict` carrying the current metadata and
    /// spec; a version already consumed by a soft-deleted entity yields
    /// `ConvergeError::GraveyardConflict`.
    ///
    /// Returns the updated metadata.
    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> Result<Metadata>;

    /// Read an entity's metadata and spec.
    async fn get_spec(&self, entity_ref: &EntityRef) -> Result<(Metadata, Spec)>;

    /// List every entity of a kind.
    async fn list_specs(&self, kind: &str) -> Result<Vec<(Metadata, Spec)>>;

    /// Uniform random sample of entities across all kinds, used by the
    /// resolver to heal the watchlist against missed notifications.
    async fn list_random_specs(&self, count: usize) -> Result<Vec<(Metadata, Spec)>>;

    /// Remove an entity's spec (retiring the entity record).
    async fn delete_spec(&self, entity_ref: &EntityRef) -> Result<()>;
}

/// Observed-state document store.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Replace the status wholesale.
    async fn replace_status(&self, entity_ref: &EntityRef, status: Status) -> Result<()>;

    /// Partially merge a patch into the status. A `null` leaf in the
    /// patch unsets the corresponding field.
    async fn update_status(&self, entity_ref: &EntityRef, patch: Status) -> Result<()>;

    /// Read an entity's status.
    async fn get_status(&self, entity_ref: &EntityRef) -> Result<Status>;

    /// List every status of a kind.
    async fn list_status(&self, kind: &str) -> Result<Vec<(EntityRef, Status)>>;
}

/// Watchlist snapshot store.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Load the current watchlist snapshot.
    async fn get_watchlist(&self) -> Result<Watchlist>;

    /// Persist a watchlist snapshot.
    async fn update_watchlist(&self, watchlist: Watchlist) -> Result<()>;
}

/// Intent watcher store.
#[async_trait]
pub trait IntentWatcherStore: Send + Sync {
    /// Persist a new watcher.
    async fn save_watcher(&self, watcher: IntentWatcher) -> Result<()>;

    /// Read a watcher by id.
    async fn get_watcher(&self, uuid: Uuid) -> Result<IntentWatcher>;

    /// List all watchers.
    async fn list_watchers(&self) -> Result<Vec<IntentWatcher>>;

    /// Upsert a watcher.
    async fn update_watcher(&self, watcher: IntentWatcher) -> Result<()>;

    /// Delete a watcher.
    async fn delete_watcher(&self, uuid: Uuid) -> Result<()>;
}

/// Soft-delete store.
///
/// Preserves the spec versions a deleted entity consumed so a later
/// recreation cannot silently reuse them.
#[async_trait]
pub trait GraveyardStore: Send + Sync {
    /// Record a deleted entity's consumed spec versions. Idempotent.
    async fn dispose(&self, entity: Entity) -> Result<()>;

    /// Whether a deleted entity already consumed this spec version.
    async fn check_spec_version_exists(&self, entity_ref: &EntityRef, version: i64)
        -> Result<bool>;

    /// Highest spec version the deleted entity ever reached, 0 if the
    /// entity was never disposed.
    async fn get_highest_spec_version(&self, entity_ref: &EntityRef) -> Result<i64>;
}
