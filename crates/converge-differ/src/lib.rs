//! # Differ
//!
//! Applies a kind's compiled selector set to a spec/status pair, producing
//! zero or more [`Diff`](converge_core::Diff) records, after stripping
//! status-only fields per the kind's schema.

pub mod differ;
pub mod status_fields;

pub use differ::{DiffIter, Differ};
pub use status_fields::{remove_status_only_fields, STATUS_ONLY_MARKER};
