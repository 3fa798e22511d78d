//! Entity create/update behaviour strategies.
//!
//! Each kind resolves to one strategy implementation, selected by its
//! `intentful_behaviour` and cached for the life of the process. The
//! Differ strategy is the only one that creates intent watchers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use converge_core::{
    ConvergeError, Entity, EntityRef, IntentWatcher, IntentWatcherStatus, Metadata, Spec, Status,
};
use converge_storage::{GraveyardStore, IntentWatcherStore, SpecStore, StatusStore, WatchlistStore};

use crate::error::EngineResult;
use crate::listener::ChangeNotifier;
use crate::registry::{KindRegistry, RegisteredKind};
use crate::stores::EntityStores;

/// Result of a spec write: the updated metadata and, for Differ kinds,
/// the watcher tracking the change.
#[derive(Debug, Clone)]
pub struct SpecUpdateOutcome {
    pub metadata: Metadata,
    pub watcher: Option<IntentWatcher>,
}

/// Per-kind entity lifecycle policy.
#[async_trait]
pub trait BehaviourStrategy: Send + Sync {
    /// Persist a newly constructed entity.
    async fn on_create(
        &self,
        metadata: Metadata,
        spec: Spec,
        status: Status,
    ) -> EngineResult<(Entity, Option<IntentWatcher>)>;

    /// Compare-and-swap spec write under the kind's policy.
    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> EngineResult<SpecUpdateOutcome>;

    /// Provider-reported status mutation (partial merge).
    async fn update_status(&self, entity_ref: &EntityRef, patch: Status) -> EngineResult<()>;

    /// Soft-delete the entity, preserving its versions in the graveyard.
    async fn on_delete(&self, entity_ref: &EntityRef) -> EngineResult<()>;
}

/// Read spec and status, dispose to the graveyard, remove the record.
async fn retire_entity(stores: &EntityStores, entity_ref: &EntityRef) -> EngineResult<()> {
    let (metadata, spec) = stores.specs.get_spec(entity_ref).await?;
    let status = match stores.statuses.get_status(entity_ref).await {
        Ok(status) => status,
        Err(ConvergeError::NotFound { .. }) => serde_json::Value::Null,
        Err(e) => return Err(e.into()),
    };
    stores
        .graveyard
        .dispose(Entity {
            metadata,
            spec,
            status,
        })
        .await?;
    stores.specs.delete_spec(entity_ref).await?;
    info!(entity_id = %entity_ref.uuid, "Entity deleted");
    Ok(())
}

/// Basic behaviour: status mirrors the spec on every write.
pub struct BasicStrategy {
    stores: EntityStores,
    notifier: Option<ChangeNotifier>,
}

impl BasicStrategy {
    #[must_use]
    pub fn new(stores: EntityStores, notifier: Option<ChangeNotifier>) -> Self {
        Self { stores, notifier }
    }
}

#[async_trait]
impl BehaviourStrategy for BasicStrategy {
    async fn on_create(
        &self,
        metadata: Metadata,
        spec: Spec,
        _status: Status,
    ) -> EngineResult<(Entity, Option<IntentWatcher>)> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        self.stores
            .statuses
            .replace_status(&entity_ref, spec.clone())
            .await?;
        Ok((
            Entity {
                metadata: written,
                spec: spec.clone(),
                status: spec,
            },
            None,
        ))
    }

    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> EngineResult<SpecUpdateOutcome> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        self.stores
            .statuses
            .replace_status(&entity_ref, spec)
            .await?;
        if let Some(notifier) = &self.notifier {
            notifier.spec_changed(entity_ref);
        }
        Ok(SpecUpdateOutcome {
            metadata: written,
            watcher: None,
        })
    }

    async fn update_status(&self, entity_ref: &EntityRef, patch: Status) -> EngineResult<()> {
        self.stores.statuses.update_status(entity_ref, patch).await?;
        if let Some(notifier) = &self.notifier {
            notifier.status_changed(entity_ref.clone());
        }
        Ok(())
    }

    async fn on_delete(&self, entity_ref: &EntityRef) -> EngineResult<()> {
        retire_entity(&self.stores, entity_ref).await
    }
}

/// Spec-only behaviour: the status is the spec and is never independently
/// observable.
pub struct SpecOnlyStrategy {
    stores: EntityStores,
    notifier: Option<ChangeNotifier>,
}

impl SpecOnlyStrategy {
    #[must_use]
    pub fn new(stores: EntityStores, notifier: Option<ChangeNotifier>) -> Self {
        Self { stores, notifier }
    }
}

#[async_trait]
impl BehaviourStrategy for SpecOnlyStrategy {
    async fn on_create(
        &self,
        metadata: Metadata,
        spec: Spec,
        _status: Status,
    ) -> EngineResult<(Entity, Option<IntentWatcher>)> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        self.stores
            .statuses
            .replace_status(&entity_ref, spec.clone())
            .await?;
        Ok((
            Entity {
                metadata: written,
                spec: spec.clone(),
                status: spec,
            },
            None,
        ))
    }

    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> EngineResult<SpecUpdateOutcome> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        self.stores
            .statuses
            .replace_status(&entity_ref, spec)
            .await?;
        if let Some(notifier) = &self.notifier {
            notifier.spec_changed(entity_ref);
        }
        Ok(SpecUpdateOutcome {
            metadata: written,
            watcher: None,
        })
    }

    async fn update_status(&self, _entity_ref: &EntityRef, _patch: Status) -> EngineResult<()> {
        Err(ConvergeError::Validation {
            message: "status of a spec-only kind cannot be updated directly".to_string(),
        }
        .into())
    }

    async fn on_delete(&self, entity_ref: &EntityRef) -> EngineResult<()> {
        retire_entity(&self.stores, entity_ref).await
    }
}

/// Differ behaviour: spec writes are diffed against the observed status
/// and tracked by intent watchers until the provider converges them.
pub struct DifferStrategy {
    stores: EntityStores,
    registered: Arc<RegisteredKind>,
    notifier: Option<ChangeNotifier>,
}

impl DifferStrategy {
    #[must_use]
    pub fn new(
        stores: EntityStores,
        registered: Arc<RegisteredKind>,
        notifier: Option<ChangeNotifier>,
    ) -> Self {
        Self {
            stores,
            registered,
            notifier,
        }
    }

    /// Create the watcher for a spec write, promote it when it is still
    /// the live one, and register the entity in the watchlist.
    async fn track_spec_change(
        &self,
        written: &Metadata,
        spec: &Spec,
        status: &Status,
    ) -> EngineResult<IntentWatcher> {
        let entity_ref = written.entity_ref();
        let diffs = self.registered.differ.all_diffs(spec, status);
        debug!(
            entity_id = %entity_ref.uuid,
            diff_count = diffs.len(),
            "Tracking spec change"
        );

        let mut watcher = IntentWatcher::new(entity_ref.clone(), written.spec_version, diffs);

        // The watcher goes Active only while its version is still the
        // entity's current one; a racing writer leaves it Pending for the
        // listener to resolve as superseded.
        let (current, _) = self.stores.specs.get_spec(&entity_ref).await?;
        if current.spec_version == written.spec_version {
            watcher.transition(IntentWatcherStatus::Active);
        }
        self.stores.watchers.save_watcher(watcher.clone()).await?;

        let mut watchlist = self.stores.watchlist.get_watchlist().await?;
        if watchlist.ensure(entity_ref.clone()) {
            self.stores.watchlist.update_watchlist(watchlist).await?;
        }

        if let Some(notifier) = &self.notifier {
            notifier.spec_changed(entity_ref);
        }
        Ok(watcher)
    }
}

#[async_trait]
impl BehaviourStrategy for DifferStrategy {
    async fn on_create(
        &self,
        metadata: Metadata,
        spec: Spec,
        status: Status,
    ) -> EngineResult<(Entity, Option<IntentWatcher>)> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        self.stores
            .statuses
            .replace_status(&entity_ref, status.clone())
            .await?;

        // A constructor procedure may populate a status that already
        // differs from the spec; track the discrepancy from the start.
        let watcher = if self
            .registered
            .differ
            .diffs(&spec, &status)
            .next()
            .is_some()
        {
            Some(self.track_spec_change(&written, &spec, &status).await?)
        } else {
            None
        };

        Ok((
            Entity {
                metadata: written,
                spec,
                status,
            },
            watcher,
        ))
    }

    async fn update_spec(&self, metadata: Metadata, spec: Spec) -> EngineResult<SpecUpdateOutcome> {
        let written = self.stores.specs.update_spec(metadata, spec.clone()).await?;
        let entity_ref = written.entity_ref();
        let status = match self.stores.statuses.get_status(&entity_ref).await {
            Ok(status) => status,
            Err(ConvergeError::NotFound { .. }) => serde_json::Value::Null,
            Err(e) => return Err(e.into()),
        };

        let watcher = self.track_spec_change(&written, &spec, &status).await?;
        Ok(SpecUpdateOutcome {
            metadata: written,
            watcher: Some(watcher),
        })
    }

    async fn update_status(&self, entity_ref: &EntityRef, patch: Status) -> EngineResult<()> {
        self.stores.statuses.update_status(entity_ref, patch).await?;

        // Status movement may have resolved or surfaced diffs; make sure
        // the entity is watched and let the listener rediff it.
        let mut watchlist = self.stores.watchlist.get_watchlist().await?;
        if watchlist.ensure(entity_ref.clone()) {
            self.stores.watchlist.update_watchlist(watchlist).await?;
        }
        if let Some(notifier) = &self.notifier {
            notifier.status_changed(entity_ref.clone());
        }
        Ok(())
    }

    async fn on_delete(&self, entity_ref: &EntityRef) -> EngineResult<()> {
        retire_entity(&self.stores, entity_ref).await
    }
}

/// Per-kind strategy table, resolved once at startup.
pub struct BehaviourResolver {
    strategies: HashMap<String, Arc<dyn BehaviourStrategy>>,
}

impl BehaviourResolver {
    /// Build the strategy for every registered kind.
    #[must_use]
    pub fn new(
        stores: EntityStores,
        registry: &KindRegistry,
        notifier: Option<ChangeNotifier>,
    ) -> Self {
        let mut strategies: HashMap<String, Arc<dyn BehaviourStrategy>> = HashMap::new();
        for name in registry.kind_names() {
            let Some(registered) = registry.get(&name) else {
                continue;
            };
            let strategy: Arc<dyn BehaviourStrategy> = match registered.kind.intentful_behaviour {
                converge_core::IntentfulBehaviour::Basic => {
                    Arc::new(BasicStrategy::new(stores.clone(), notifier.clone()))
                }
                converge_core::IntentfulBehaviour::SpecOnly => {
                    Arc::new(SpecOnlyStrategy::new(stores.clone(), notifier.clone()))
                }
                converge_core::IntentfulBehaviour::Differ => Arc::new(DifferStrategy::new(
                    stores.clone(),
                    registered,
                    notifier.clone(),
                )),
            };
            strategies.insert(name, strategy);
        }
        Self { strategies }
    }

    /// The cached strategy for a kind.
    pub fn strategy_for(&self, kind_name: &str) -> EngineResult<&Arc<dyn BehaviourStrategy>> {
        self.strategies
            .get(kind_name)
            .ok_or_else(|| crate::error::EngineError::UnknownKind(kind_name.to_string()))
    }
}
