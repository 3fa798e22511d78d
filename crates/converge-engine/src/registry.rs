//! Kind registry.
//!
//! Kinds are registered once per provider; registration validates every
//! selector signature and compiles the kind's differ up front, so diff
//! time never sees a malformed selector. The registry is built during
//! provider registration and then shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use converge_core::{IntentfulBehaviour, Kind};
use converge_differ::Differ;

use crate::error::{EngineError, EngineResult};

/// A registered kind with its compiled differ.
#[derive(Debug)]
pub struct RegisteredKind {
    pub kind: Kind,
    pub differ: Differ,
}

/// Registry of kinds known to this process.
#[derive(Debug, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, Arc<RegisteredKind>>,
}

impl KindRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a kind, replacing any previous registration
    /// under the same name.
    pub fn register(&mut self, kind: Kind) -> EngineResult<()> {
        kind.validate()?;
        let differ = Differ::for_kind(&kind)?;
        let name = kind.name.clone();
        self.kinds.insert(name, Arc::new(RegisteredKind { kind, differ }));
        Ok(())
    }

    /// Look up a kind by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredKind>> {
        self.kinds.get(name).cloned()
    }

    /// Look up a kind, erroring when no provider registered it.
    pub fn get_or_err(&self, name: &str) -> EngineResult<Arc<RegisteredKind>> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownKind(name.to_string()))
    }

    /// Names of every registered kind.
    #[must_use]
    pub fn kind_names(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }

    /// Names of every kind using the Differ behaviour.
    #[must_use]
    pub fn differ_kind_names(&self) -> Vec<String> {
        self.kinds
            .values()
            .filter(|r| r.kind.intentful_behaviour == IntentfulBehaviour::Differ)
            .map(|r| r.kind.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::IntentfulSignature;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = KindRegistry::new();
        let kind = Kind::new("cluster", json!({})).with_signature(IntentfulSignature::new(
            "x",
            "http://provider/x",
            "http://provider",
        ));
        registry.register(kind).unwrap();
        assert!(registry.get("cluster").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_register_rejects_malformed_signature() {
        let mut registry = KindRegistry::new();
        let kind = Kind::new("cluster", json!({})).with_signature(IntentfulSignature::new(
            "a..b",
            "http://provider/a",
            "http://provider",
        ));
        assert!(registry.register(kind).is_err());
        assert!(registry.get("cluster").is_none());
    }

    #[test]
    fn test_differ_kind_names_filters_behaviour() {
        let mut registry = KindRegistry::new();
        registry
            .register(Kind::new("tracked", json!({})).with_behaviour(IntentfulBehaviour::Differ))
            .unwrap();
        registry
            .register(Kind::new("untracked", json!({})))
            .unwrap();
        assert_eq!(registry.differ_kind_names(), vec!["tracked".to_string()]);
    }
}
