//! converge Core Library
//!
//! Shared types for the converge control plane.
//!
//! # Modules
//!
//! - [`entity`] - Entity identity, spec and status documents
//! - [`kind`] - Kind descriptors and intentful signatures
//! - [`diff`] - Detected spec/status discrepancies
//! - [`watcher`] - Intent watcher records and state machine
//! - [`watchlist`] - Registry of entities with outstanding diffs
//! - [`error`] - Standardized error types (`ConvergeError`)

pub mod diff;
pub mod entity;
pub mod error;
pub mod kind;
pub mod watcher;
pub mod watchlist;

// Re-export main types for convenient access
pub use diff::Diff;
pub use entity::{Entity, EntityRef, Metadata, Spec, Status};
pub use error::{ConvergeError, Result};
pub use kind::{DiffSelectionKind, IntentfulBehaviour, IntentfulSignature, Kind};
pub use watcher::{IntentWatcher, IntentWatcherStatus};
pub use watchlist::{Delay, Watchlist, WatchlistEntry};

// The selector output shape travels with diffs everywhere.
pub use converge_sfs::DiffContent;
