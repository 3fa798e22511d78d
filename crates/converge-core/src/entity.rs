//! Entity identity and state documents.
//!
//! An entity pairs a desired-state document (spec) with the last observed
//! state (status). The metadata carries the optimistic-concurrency token
//! every spec write must present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Desired state of an entity, supplied by the caller.
pub type Spec = serde_json::Value;

/// Last observed state of an entity, supplied by the provider.
pub type Status = serde_json::Value;

/// Identity of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Entity id.
    pub uuid: Uuid,

    /// Kind name.
    pub kind: String,

    /// Prefix of the provider that owns the kind.
    pub provider_prefix: String,

    /// Version of the provider that owns the kind.
    pub provider_version: String,

    /// Monotonically increasing optimistic-concurrency token.
    /// Zero until the first spec write.
    pub spec_version: i64,

    /// When the entity was created.
    pub created_at: DateTime<Utc>,

    /// When the entity was soft-deleted, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Create metadata for a new entity of a kind.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        provider_prefix: impl Into<String>,
        provider_version: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: kind.into(),
            provider_prefix: provider_prefix.into(),
            provider_version: provider_version.into(),
            spec_version: 0,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Reference to the entity this metadata identifies.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            uuid: self.uuid,
            kind: self.kind.clone(),
            provider_prefix: self.provider_prefix.clone(),
            provider_version: self.provider_version.clone(),
        }
    }
}

/// Reference to an entity of a provider-owned kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity id.
    pub uuid: Uuid,

    /// Kind name.
    pub kind: String,

    /// Prefix of the provider that owns the kind.
    pub provider_prefix: String,

    /// Version of the provider that owns the kind.
    pub provider_version: String,
}

/// A full entity: identity plus its spec and status documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub metadata: Metadata,
    pub spec: Spec,
    pub status: Status,
}

impl Entity {
    /// Reference to this entity.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        self.metadata.entity_ref()
    }
}
