//! Intent watcher records.
//!
//! A watcher tracks the reconciliation progress of the diffs caused by one
//! spec change. Watchers are persisted; the resolver and the change
//! listener advance them as diffs shrink or the entity moves on to a newer
//! spec version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::Diff;
use crate::entity::EntityRef;

/// Watcher state machine.
///
/// `Pending` and `Active` are live; the other four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentWatcherStatus {
    /// Created for a spec change, not yet adopted as the live watcher.
    Pending,

    /// The most recent watcher for the entity's current spec version.
    Active,

    /// Every tracked diff resolved.
    CompletedSuccessfully,

    /// Superseded by a newer spec version after partial progress.
    CompletedPartially,

    /// Superseded by a newer spec version with no progress made.
    Outdated,

    /// Abandoned after an unrecoverable handler failure.
    Failed,
}

impl IntentWatcherStatus {
    /// Whether this status ends the watcher's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            IntentWatcherStatus::Pending | IntentWatcherStatus::Active
        )
    }

    /// String representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentWatcherStatus::Pending => "pending",
            IntentWatcherStatus::Active => "active",
            IntentWatcherStatus::CompletedSuccessfully => "completed_successfully",
            IntentWatcherStatus::CompletedPartially => "completed_partially",
            IntentWatcherStatus::Outdated => "outdated",
            IntentWatcherStatus::Failed => "failed",
        }
    }
}

/// Persisted record tracking one spec change's reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentWatcher {
    /// Watcher id.
    pub uuid: Uuid,

    /// The entity whose spec change this watcher tracks.
    pub entity_ref: EntityRef,

    /// The spec version this watcher targets.
    pub spec_version: i64,

    /// Outstanding diffs; shrinks monotonically across rediffs.
    pub diffs: Vec<Diff>,

    /// Current lifecycle state.
    pub status: IntentWatcherStatus,

    /// Number of failed handler invocations or liveness probes.
    pub times_failed: u32,

    /// Most recent handler error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_handler_error: Option<String>,

    /// When `status` last changed.
    pub last_status_changed: DateTime<Utc>,

    /// When the watcher was created.
    pub created_at: DateTime<Utc>,

    /// The user who initiated the spec change, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl IntentWatcher {
    /// Create a pending watcher for a spec change.
    #[must_use]
    pub fn new(entity_ref: EntityRef, spec_version: i64, diffs: Vec<Diff>) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            entity_ref,
            spec_version,
            diffs,
            status: IntentWatcherStatus::Pending,
            times_failed: 0,
            last_handler_error: None,
            last_status_changed: now,
            created_at: now,
            user: None,
        }
    }

    /// Attribute the watcher to the initiating user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Move to a new status, stamping the transition time. A repeated
    /// transition to the current status changes nothing, so replayed
    /// notifications stay idempotent.
    pub fn transition(&mut self, status: IntentWatcherStatus) {
        if self.status != status {
            self.status = status;
            self.last_status_changed = Utc::now();
        }
    }

    /// Record a failed handler invocation or liveness probe.
    pub fn record_handler_failure(&mut self, error: impl Into<String>) {
        self.times_failed += 1;
        self.last_handler_error = Some(error.into());
    }

    /// Whether a terminal watcher has outlived the retention grace period.
    #[must_use]
    pub fn expired(&self, grace_seconds: u64, now: DateTime<Utc>) -> bool {
        self.status.is_terminal()
            && now - self.last_status_changed > chrono::Duration::seconds(grace_seconds as i64)
    }
}
