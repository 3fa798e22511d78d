//! Diff resolver loop.
//!
//! A single cooperative timer loop per process: each resolution tick
//! reloads the watchlist snapshot, rediffs every entry, fires one
//! provider callback per entity with outstanding diffs, and tracks the
//! retry delay. Separate intervals top the watchlist up from a random
//! entity sample (healing missed notifications) and prune expired
//! terminal watchers.
//!
//! Several resolver processes may run against the same store: spec writes
//! are compare-and-swapped, watchlist/watcher updates are idempotent
//! upserts, and diff identity is structural, so a duplicate tick changes
//! nothing. No distributed locks are taken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use converge_core::{
    ConvergeError, Delay, Diff, Entity, IntentfulBehaviour, Watchlist, WatchlistEntry,
};
use converge_storage::{SpecStore, StatusStore, WatchlistStore};

use crate::callback::{handler_url, CallbackClient, DEFAULT_CALLBACK_TIMEOUT_SECS};
use crate::error::EngineResult;
use crate::registry::KindRegistry;
use crate::selection::select_diff;
use crate::stores::EntityStores;
use crate::watchers::WatcherService;

/// Retry backoff schedule, indexed by the failure count of the diff's
/// owning watcher.
pub const BACKOFF_SCHEDULE_SECS: [u64; 5] = [10, 30, 120, 600, 1800];

/// Backoff delay for the nth failure (1-based, saturating at the end of
/// the schedule).
#[must_use]
pub fn backoff_seconds(times_failed: u32) -> u64 {
    let index = (times_failed.saturating_sub(1) as usize).min(BACKOFF_SCHEDULE_SECS.len() - 1);
    BACKOFF_SCHEDULE_SECS[index]
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How often to rediff watchlist entries (in seconds).
    pub resolve_interval_secs: u64,

    /// How often to top up the watchlist from an entity sample (in seconds).
    pub top_up_interval_secs: u64,

    /// How often to prune expired terminal watchers (in seconds).
    pub prune_interval_secs: u64,

    /// Grace period before a terminal watcher is deleted (in seconds).
    pub watcher_retention_secs: u64,

    /// Entities sampled per top-up pass.
    pub top_up_sample_size: usize,

    /// Retry delay when neither the handler nor the kind specifies one.
    pub default_delay_secs: u64,

    /// Bound on a single callback request (in seconds).
    pub callback_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolve_interval_secs: 5,
            top_up_interval_secs: 120,
            prune_interval_secs: 60,
            watcher_retention_secs: 600,
            top_up_sample_size: 10,
            default_delay_secs: 10,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

/// Background loop converging watched entities.
pub struct DiffResolver {
    stores: EntityStores,
    registry: Arc<KindRegistry>,
    watchers: WatcherService,
    client: CallbackClient,
    config: ResolverConfig,
    shutdown: Arc<AtomicBool>,
}

impl DiffResolver {
    /// Create a resolver over a store bundle and kind registry.
    pub fn new(
        stores: EntityStores,
        registry: Arc<KindRegistry>,
        config: ResolverConfig,
    ) -> EngineResult<Self> {
        let client = CallbackClient::new(Duration::from_secs(config.callback_timeout_secs))?;
        Ok(Self {
            watchers: WatcherService::new(stores.clone()),
            stores,
            registry,
            client,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run the resolver until shutdown is requested.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            resolve_interval_secs = self.config.resolve_interval_secs,
            top_up_interval_secs = self.config.top_up_interval_secs,
            "Starting diff resolver"
        );

        let mut resolve_interval = interval(Duration::from_secs(self.config.resolve_interval_secs));
        let mut top_up_interval = interval(Duration::from_secs(self.config.top_up_interval_secs));
        let mut prune_interval = interval(Duration::from_secs(self.config.prune_interval_secs));

        loop {
            tokio::select! {
                _ = resolve_interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        info!("Resolver shutdown requested, stopping loop");
                        break;
                    }
                    self.resolve_tick().await;
                }
                _ = top_up_interval.tick() => {
                    self.top_up_tick().await;
                }
                _ = prune_interval.tick() => {
                    self.prune_tick().await;
                }
            }
        }
        info!("Diff resolver stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Resolver shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// One resolution pass over the watchlist snapshot.
    ///
    /// Per-entity failures are isolated: an entry's error is logged and
    /// the pass continues with the next entry.
    pub async fn resolve_tick(&self) {
        let mut watchlist = match self.stores.watchlist.get_watchlist().await {
            Ok(watchlist) => watchlist,
            Err(e) => {
                error!(error = %e, "Failed to load watchlist");
                return;
            }
        };

        let entries: Vec<WatchlistEntry> = watchlist.entries().cloned().collect();
        for entry in entries {
            let entity_id = entry.entity_ref.uuid;
            if let Err(e) = self.process_entry(&mut watchlist, entry).await {
                error!(
                    entity_id = %entity_id,
                    error = %e,
                    "Failed to process watchlist entry"
                );
            }
        }

        if let Err(e) = self.stores.watchlist.update_watchlist(watchlist).await {
            error!(error = %e, "Failed to persist watchlist");
        }
    }

    async fn process_entry(
        &self,
        watchlist: &mut Watchlist,
        entry: WatchlistEntry,
    ) -> EngineResult<()> {
        let entity_id = entry.entity_ref.uuid;

        // An armed backoff gates the whole entry until it elapses.
        if let (Some(_), Some(delay)) = (&entry.in_flight, &entry.delay) {
            if !delay.elapsed(Utc::now()) {
                return Ok(());
            }
        }

        let (metadata, spec) = match self.stores.specs.get_spec(&entry.entity_ref).await {
            Ok(pair) => pair,
            Err(ConvergeError::NotFound { .. }) => {
                debug!(entity_id = %entity_id, "Watched entity is gone; dropping entry");
                watchlist.remove(entity_id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let status = match self.stores.statuses.get_status(&entry.entity_ref).await {
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

        self.watchers.advance_for_entity(&entity, &fresh).await?;

        if fresh.is_empty() {
            debug!(entity_id = %entity_id, "Entity converged; dropping watchlist entry");
            watchlist.remove(entity_id);
            return Ok(());
        }

        // Retry the in-flight diff while it persists; probe its previous
        // handler first so a dead one is recorded on the owning watcher.
        let retried: Option<Diff> = entry
            .in_flight
            .as_ref()
            .and_then(|in_flight| fresh.iter().find(|fresh| fresh.matches(in_flight)).cloned());
        if retried.is_some() {
            if let Some(url) = entry.in_flight.as_ref().and_then(|d| d.handler_url.as_ref()) {
                if let Err(probe) = self.client.probe_handler(url).await {
                    warn!(
                        entity_id = %entity_id,
                        error = %probe,
                        "Diff handler liveness probe failed"
                    );
                    if let Some(in_flight) = &entry.in_flight {
                        self.watchers
                            .record_handler_failure(entity_id, in_flight, &probe.to_string())
                            .await?;
                    }
                }
            }
        }

        let target = match retried {
            Some(diff) => diff,
            None => {
                let Some(selected) = select_diff(registered.kind.diff_selection_strategy, &fresh)
                else {
                    return Ok(());
                };
                selected.clone()
            }
        };

        let mut fired = target;
        fired.handler_url = Some(handler_url(&fired.intentful_signature.base_callback_url));

        let delay_seconds = match self.client.invoke_diff_handler(&fired, &entity).await {
            Ok(Some(seconds)) => {
                debug!(entity_id = %entity_id, seconds, "Handler requested delay");
                seconds
            }
            Ok(None) => registered
                .kind
                .diff_delay
                .unwrap_or(self.config.default_delay_secs),
            Err(e) => {
                warn!(
                    entity_id = %entity_id,
                    error = %e,
                    "Diff handler invocation failed"
                );
                let failures = self
                    .watchers
                    .record_handler_failure(entity_id, &fired, &e.to_string())
                    .await?;
                backoff_seconds(failures)
            }
        };

        if let Some(slot) = watchlist.get_mut(entity_id) {
            slot.in_flight = Some(fired);
            slot.delay = Some(Delay::new(delay_seconds));
        }
        Ok(())
    }

    /// Top the watchlist up with a random sample of differ-kind entities,
    /// guarding against missed change notifications.
    pub async fn top_up_tick(&self) {
        let sampled = match self
            .stores
            .specs
            .list_random_specs(self.config.top_up_sample_size)
            .await
        {
            Ok(sampled) => sampled,
            Err(e) => {
                error!(error = %e, "Failed to sample entities for watchlist top-up");
                return;
            }
        };
        if sampled.is_empty() {
            return;
        }

        let mut watchlist = match self.stores.watchlist.get_watchlist().await {
            Ok(watchlist) => watchlist,
            Err(e) => {
                error!(error = %e, "Failed to load watchlist for top-up");
                return;
            }
        };

        let mut added = 0;
        for (metadata, _) in sampled {
            let Some(registered) = self.registry.get(&metadata.kind) else {
                continue;
            };
            if registered.kind.intentful_behaviour != IntentfulBehaviour::Differ {
                continue;
            }
            if watchlist.ensure(metadata.entity_ref()) {
                added += 1;
            }
        }

        if added > 0 {
            info!(count = added, "Topped up watchlist from entity sample");
            if let Err(e) = self.stores.watchlist.update_watchlist(watchlist).await {
                error!(error = %e, "Failed to persist topped-up watchlist");
            }
        }
    }

    /// Prune expired terminal watchers.
    pub async fn prune_tick(&self) {
        if let Err(e) = self
            .watchers
            .prune_expired(self.config.watcher_retention_secs)
            .await
        {
            error!(error = %e, "Failed to prune expired watchers");
        }
    }
}
