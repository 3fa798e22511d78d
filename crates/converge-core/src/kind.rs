//! Kind descriptors and intentful signatures.
//!
//! A kind describes one entity type a provider registers: its structural
//! schema, the selector signatures whose diffs the provider can resolve,
//! and the policies governing entity updates and diff selection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use converge_sfs::SfsResult;

/// Entity create/update policy of a kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentfulBehaviour {
    /// Spec writes mirror status unconditionally; no watchers.
    #[default]
    Basic,

    /// Status is the spec; direct status mutation is rejected.
    SpecOnly,

    /// Spec writes are diffed against status and tracked by watchers.
    Differ,
}

/// Policy for choosing which diff to act on when several exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSelectionKind {
    /// First diff in signature declaration order.
    #[default]
    Basic,

    /// Uniform random draw.
    Random,
}

/// One selector signature a provider registered, with the callback
/// addresses of the procedure that resolves its diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentfulSignature {
    /// Selector signature source.
    pub signature: String,

    /// Callback invoked with a diff to resolve.
    pub procedural_callback_url: String,

    /// Base address of the handling process, probed for liveness.
    pub base_callback_url: String,
}

impl IntentfulSignature {
    /// Create a signature entry.
    #[must_use]
    pub fn new(
        signature: impl Into<String>,
        procedural_callback_url: impl Into<String>,
        base_callback_url: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            procedural_callback_url: procedural_callback_url.into(),
            base_callback_url: base_callback_url.into(),
        }
    }
}

/// Entity-type descriptor registered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    /// Kind name, unique within a provider.
    pub name: String,

    /// Structural schema of the entity documents.
    pub schema: serde_json::Value,

    /// Selector signatures in declaration order.
    #[serde(default)]
    pub intentful_signatures: Vec<IntentfulSignature>,

    /// Dependency relation among signatures (field -> prerequisite
    /// fields). Carried for providers that declare it; diff evaluation
    /// currently follows declaration order.
    #[serde(default)]
    pub sig_dependencies: HashMap<String, Vec<String>>,

    /// Default retry delay in seconds between callback invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_delay: Option<u64>,

    /// Policy for choosing among concurrent diffs.
    #[serde(default)]
    pub diff_selection_strategy: DiffSelectionKind,

    /// Entity create/update policy.
    #[serde(default)]
    pub intentful_behaviour: IntentfulBehaviour,
}

impl Kind {
    /// Create a kind with the default (Basic) policies.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
            intentful_signatures: Vec::new(),
            sig_dependencies: HashMap::new(),
            diff_delay: None,
            diff_selection_strategy: DiffSelectionKind::default(),
            intentful_behaviour: IntentfulBehaviour::default(),
        }
    }

    /// Add an intentful signature.
    #[must_use]
    pub fn with_signature(mut self, signature: IntentfulSignature) -> Self {
        self.intentful_signatures.push(signature);
        self
    }

    /// Set the entity create/update policy.
    #[must_use]
    pub fn with_behaviour(mut self, behaviour: IntentfulBehaviour) -> Self {
        self.intentful_behaviour = behaviour;
        self
    }

    /// Set the diff selection policy.
    #[must_use]
    pub fn with_selection_strategy(mut self, strategy: DiffSelectionKind) -> Self {
        self.diff_selection_strategy = strategy;
        self
    }

    /// Set the default retry delay.
    #[must_use]
    pub fn with_diff_delay(mut self, seconds: u64) -> Self {
        self.diff_delay = Some(seconds);
        self
    }

    /// Validate every registered signature.
    ///
    /// Called at provider-registration time so a malformed selector is
    /// rejected before it can reach the differ.
    pub fn validate(&self) -> SfsResult<()> {
        for signature in &self.intentful_signatures {
            converge_sfs::validate(&signature.signature)?;
        }
        Ok(())
    }
}
