//! Shared fixtures for engine integration tests.

use std::sync::Arc;

use serde_json::{json, Value};

use converge_core::{
    DiffSelectionKind, IntentfulBehaviour, IntentfulSignature, Kind, Metadata,
};
use converge_engine::{EntityStores, KindRegistry};
use converge_storage::{SpecStore, StatusStore, WatchlistStore};

pub const KIND: &str = "cluster";

/// Registry with one Differ kind whose signatures call back into the mock
/// provider.
pub fn registry_for(server_uri: &str, signatures: &[&str]) -> Arc<KindRegistry> {
    let mut kind = Kind::new(KIND, json!({}))
        .with_behaviour(IntentfulBehaviour::Differ)
        .with_selection_strategy(DiffSelectionKind::Basic);
    for signature in signatures {
        kind = kind.with_signature(IntentfulSignature::new(
            *signature,
            format!("{server_uri}/handler/{signature}"),
            server_uri,
        ));
    }
    let mut registry = KindRegistry::new();
    registry.register(kind).unwrap();
    Arc::new(registry)
}

/// Write an entity's spec and status directly into the store.
pub async fn seed_entity(stores: &EntityStores, spec: Value, status: Value) -> Metadata {
    let metadata = Metadata::new(KIND, "infra", "v1");
    let written = stores.specs.update_spec(metadata, spec).await.unwrap();
    stores
        .statuses
        .replace_status(&written.entity_ref(), status)
        .await
        .unwrap();
    written
}

/// Register an entity in the watchlist.
pub async fn watch(stores: &EntityStores, metadata: &Metadata) {
    let mut watchlist = stores.watchlist.get_watchlist().await.unwrap();
    watchlist.ensure(metadata.entity_ref());
    stores.watchlist.update_watchlist(watchlist).await.unwrap();
}
