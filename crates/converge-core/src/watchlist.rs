//! Persisted registry of entities with outstanding diffs.
//!
//! The resolver works off the watchlist: entries are added whenever a
//! differ-kind entity's spec or status changes and removed once a rediff
//! comes back empty. Each entry may carry the diff currently being
//! handled and the retry delay before the next attempt.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::Diff;
use crate::entity::EntityRef;

/// Retry delay attached to an in-flight diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    /// Seconds to wait from `set_at`.
    pub delay_seconds: u64,

    /// When the delay was armed.
    pub set_at: DateTime<Utc>,
}

impl Delay {
    /// Arm a delay starting now.
    #[must_use]
    pub fn new(delay_seconds: u64) -> Self {
        Self {
            delay_seconds,
            set_at: Utc::now(),
        }
    }

    /// Whether the delay has elapsed at `now`.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.set_at >= chrono::Duration::seconds(self.delay_seconds as i64)
    }
}

/// One watched entity with its in-flight bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    /// The watched entity.
    pub entity_ref: EntityRef,

    /// The diff currently being handled by a provider, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<Diff>,

    /// Backoff before the in-flight diff is retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

impl WatchlistEntry {
    /// Create an entry with no in-flight diff.
    #[must_use]
    pub fn new(entity_ref: EntityRef) -> Self {
        Self {
            entity_ref,
            in_flight: None,
            delay: None,
        }
    }

    /// Clear the in-flight bookkeeping.
    pub fn clear_in_flight(&mut self) {
        self.in_flight = None;
        self.delay = None;
    }
}

/// Registry of entities with outstanding diffs awaiting resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    entries: HashMap<Uuid, WatchlistEntry>,
}

impl Watchlist {
    /// Create an empty watchlist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity if absent. Returns true when a new entry was
    /// created, so re-registration on replayed notifications is a no-op.
    pub fn ensure(&mut self, entity_ref: EntityRef) -> bool {
        match self.entries.entry(entity_ref.uuid) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(WatchlistEntry::new(entity_ref));
                true
            }
        }
    }

    /// Remove an entity's entry.
    pub fn remove(&mut self, uuid: Uuid) -> Option<WatchlistEntry> {
        self.entries.remove(&uuid)
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, uuid: Uuid) -> Option<&WatchlistEntry> {
        self.entries.get(&uuid)
    }

    /// Look up an entry mutably.
    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut WatchlistEntry> {
        self.entries.get_mut(&uuid)
    }

    /// Whether an entity is registered.
    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entries.contains_key(&uuid)
    }

    /// Iterate over the entries.
    pub fn entries(&self) -> impl Iterator<Item = &WatchlistEntry> {
        self.entries.values()
    }

    /// Number of watched entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the watchlist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
