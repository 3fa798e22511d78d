//! Error taxonomy shared across the control plane.
//!
//! # Example
//!
//! ```
//! use converge_core::{ConvergeError, Result};
//!
//! fn find_watcher(id: &str) -> Result<String> {
//!     if id.is_empty() {
//!         return Err(ConvergeError::NotFound {
//!             resource: "IntentWatcher".to_string(),
//!             id: None,
//!         });
//!     }
//!     Ok(format!("watcher {id}"))
//! }
//! ```

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{Metadata, Spec};

/// Standardized error type for converge.
///
/// - `Conflict` — a spec write presented a stale version; recoverable, the
///   caller re-reads the exposed current state and retries.
/// - `GraveyardConflict` — the version was already consumed by a
///   soft-deleted entity; the caller must advance past the highest known
///   version.
/// - `NotFound` — the requested entity or watcher is absent; fatal to that
///   request only.
/// - `Validation` — malformed input, including selector signatures
///   rejected at provider-registration time.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvergeError {
    /// Stale spec version on write.
    #[error(
        "conflicting spec version {provided_version} for entity {}: current version is {}",
        metadata.uuid,
        metadata.spec_version
    )]
    Conflict {
        /// Current metadata on record, exposing the winning version.
        metadata: Metadata,
        /// Spec on record for the current version.
        existing_spec: Spec,
        /// The stale version the caller presented.
        provided_version: i64,
    },

    /// Spec version already consumed by a soft-deleted entity.
    #[error(
        "spec version {version} for entity {uuid} was already used by a deleted entity; \
         highest known version is {highest_version}"
    )]
    GraveyardConflict {
        /// The entity id being written.
        uuid: Uuid,
        /// The conflicting version.
        version: i64,
        /// Highest version the deleted entity ever reached.
        highest_version: i64,
    },

    /// Requested resource was not found.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource (e.g. "Entity", "IntentWatcher").
        resource: String,
        /// Optional identifier of the resource.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Input validation failure.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

impl ConvergeError {
    /// Not-found error for an entity reference.
    #[must_use]
    pub fn entity_not_found(uuid: Uuid) -> Self {
        ConvergeError::NotFound {
            resource: "Entity".to_string(),
            id: Some(uuid.to_string()),
        }
    }

    /// Not-found error for a watcher.
    #[must_use]
    pub fn watcher_not_found(uuid: Uuid) -> Self {
        ConvergeError::NotFound {
            resource: "IntentWatcher".to_string(),
            id: Some(uuid.to_string()),
        }
    }
}

impl From<converge_sfs::SfsError> for ConvergeError {
    fn from(err: converge_sfs::SfsError) -> Self {
        ConvergeError::Validation {
            message: err.to_string(),
        }
    }
}

/// Type alias for Results using `ConvergeError`.
pub type Result<T> = std::result::Result<T, ConvergeError>;
