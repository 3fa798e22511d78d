//! Change listener.
//!
//! An event feed of entity spec/status changes driving watcher-state
//! updates independently of the resolver's tick. Delivery is
//! at-least-once (notifications may replay after a restart), so handling
//! is idempotent: a repeated notification rediffs to the same result and
//! changes nothing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use converge_core::{ConvergeError, Entity, EntityRef};
use converge_storage::{SpecStore, StatusStore, WatchlistStore};

use crate::error::EngineResult;
use crate::registry::KindRegistry;
use crate::stores::EntityStores;
use crate::watchers::WatcherService;

/// What part of the entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Spec,
    Status,
}

/// One entity-change notification.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub entity_ref: EntityRef,
    pub change: ChangeKind,
}

/// Sending half of the change feed, cloned into whatever mutates entities.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::UnboundedSender<EntityChange>,
}

impl ChangeNotifier {
    /// Notify that an entity's spec changed.
    pub fn spec_changed(&self, entity_ref: EntityRef) {
        self.send(EntityChange {
            entity_ref,
            change: ChangeKind::Spec,
        });
    }

    /// Notify that an entity's status changed.
    pub fn status_changed(&self, entity_ref: EntityRef) {
        self.send(EntityChange {
            entity_ref,
            change: ChangeKind::Status,
        });
    }

    fn send(&self, change: EntityChange) {
        // A stopped listener is not an error: the resolver's periodic
        // sampling covers missed notifications.
        if self.tx.send(change).is_err() {
            debug!("Change listener stopped; dropping notification");
        }
    }
}

/// Receiving loop advancing watchers on entity changes.
pub struct ChangeListener {
    rx: mpsc::UnboundedReceiver<EntityChange>,
    stores: EntityStores,
    registry: Arc<KindRegistry>,
    watchers: WatcherService,
}

impl ChangeListener {
    /// Create the listener and its notifier handle.
    #[must_use]
    pub fn new(stores: EntityStores, registry: Arc<KindRegistry>) -> (ChangeNotifier, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watchers = WatcherService::new(stores.clone());
        (
            ChangeNotifier { tx },
            Self {
                rx,
                stores,
                registry,
                watchers,
            },
        )
    }

    /// Consume the change feed until every notifier is dropped.
    pub async fn run(mut self) {
        info!("Starting change listener");
        while let Some(change) = self.rx.recv().await {
            if let Err(e) = self.handle(&change).await {
                error!(
                    entity_id = %change.entity_ref.uuid,
                    error = %e,
                    "Failed to handle entity change"
                );
            }
        }
        info!("Change listener stopped");
    }

    /// Handle one notification: rediff the entity, advance its watchers,
    /// and keep the watchlist registration in step with the outcome.
    pub async fn handle(&self, change: &EntityChange) -> EngineResult<()> {
        let entity_ref = &change.entity_ref;
        let (metadata, spec) = match self.stores.specs.get_spec(entity_ref).await {
            Ok(pair) => pair,
            Err(ConvergeError::NotFound { .. }) => {
                // The entity is gone; drop any leftover registration.
                let mut watchlist = self.stores.watchlist.get_watchlist().await?;
                if watchlist.remove(entity_ref.uuid).is_some() {
                    self.stores.watchlist.update_watchlist(watchlist).await?;
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let status = match self.stores.statuses.get_status(entity_ref).await {
            Ok(status) => status,
            Err(ConvergeError::NotFound { .. }) => serde_json::Value::Null,
            Err(e) => return Err(e.into()),
        };

        let registered = self.registry.get_or_err(&metadata.kind)?;
        let entity = Entity {
            metadata,
            spec,
            status,
        };
        let fresh = registered.differ.all_diffs(&entity.spec, &entity.status);
        debug!(
            entity_id = %entity.metadata.uuid,
            change = ?change.change,
            diff_count = fresh.len(),
            "Entity change rediffed"
        );

        self.watchers.advance_for_entity(&entity, &fresh).await?;

        let mut watchlist = self.stores.watchlist.get_watchlist().await?;
        let dirty = if fresh.is_empty() {
            watchlist.remove(entity.metadata.uuid).is_some()
        } else {
            watchlist.ensure(entity.entity_ref())
        };
        if dirty {
            self.stores.watchlist.update_watchlist(watchlist).await?;
        }
        Ok(())
    }
}
