//! Bundle of storage handles the engine components share.

use std::sync::Arc;

use converge_storage::{
    GraveyardStore, IntentWatcherStore, MemoryStore, SpecStore, StatusStore, WatchlistStore,
};

/// The storage handles every engine component works through.
#[derive(Clone)]
pub struct EntityStores {
    pub specs: Arc<dyn SpecStore>,
    pub statuses: Arc<dyn StatusStore>,
    pub watchlist: Arc<dyn WatchlistStore>,
    pub watchers: Arc<dyn IntentWatcherStore>,
    pub graveyard: Arc<dyn GraveyardStore>,
}

impl EntityStores {
    /// Wire every handle to one shared in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            specs: store.clone(),
            statuses: store.clone(),
            watchlist: store.clone(),
            watchers: store.clone(),
            graveyard: store,
        }
    }
}
