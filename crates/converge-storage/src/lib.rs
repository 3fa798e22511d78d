//! # Storage Interfaces
//!
//! Narrow async traits through which the engine consumes persistence,
//! plus an in-memory reference implementation.
//!
//! Persistence technology stays behind these seams: the engine never sees
//! more than compare-and-swap spec writes, idempotent upserts, and
//! snapshot reads, which is what lets several resolver processes race on
//! one backing store without distributed locks.

pub mod memory;
pub mod traits;

pub use memory::{merge_status, MemoryStore};
pub use traits::{
    GraveyardStore, IntentWatcherStore, SpecStore, StatusStore, WatchlistStore,
};
