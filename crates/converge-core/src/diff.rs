//! Diffs produced by evaluating intentful signatures.

use serde::{Deserialize, Serialize};

use converge_sfs::DiffContent;

use crate::kind::IntentfulSignature;

/// One detected discrepancy between an entity's spec and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Name of the kind the entity belongs to.
    pub kind: String,

    /// The signature whose evaluation produced this diff.
    pub intentful_signature: IntentfulSignature,

    /// The matched field-level discrepancies.
    pub diff_fields: Vec<DiffContent>,

    /// Liveness-probe address of the process currently handling the diff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_url: Option<String>,
}

impl Diff {
    /// Create a diff for a signature evaluation result.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        intentful_signature: IntentfulSignature,
        diff_fields: Vec<DiffContent>,
    ) -> Self {
        Self {
            kind: kind.into(),
            intentful_signature,
            diff_fields,
            handler_url: None,
        }
    }

    /// Canonical, order-independent equality over the diff fields.
    ///
    /// Semantically identical diffs must compare equal even when their
    /// fields were collected in a different order by another process, so
    /// comparison runs over sorted canonical serializations rather than
    /// positional equality.
    #[must_use]
    pub fn same_fields(&self, other: &Diff) -> bool {
        canonical_fields(&self.diff_fields) == canonical_fields(&other.diff_fields)
    }

    /// Whether two diffs describe the same discrepancy: same signature,
    /// structurally equal fields.
    #[must_use]
    pub fn matches(&self, other: &Diff) -> bool {
        self.intentful_signature.signature == other.intentful_signature.signature
            && self.same_fields(other)
    }
}

fn canonical_fields(fields: &[DiffContent]) -> Vec<String> {
    let mut canonical: Vec<String> = fields
        .iter()
        .map(|f| serde_json::to_string(f).unwrap_or_default())
        .collect();
    canonical.sort();
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn content(key: &str, spec: i64, status: i64) -> DiffContent {
        DiffContent {
            keys: Map::new(),
            key: key.to_string(),
            spec_val: vec![json!(spec)],
            status_val: vec![json!(status)],
        }
    }

    fn signature() -> IntentfulSignature {
        IntentfulSignature::new("[x,y]", "http://provider/xy", "http://provider")
    }

    #[test]
    fn test_same_fields_ignores_order() {
        let a = Diff::new(
            "cluster",
            signature(),
            vec![content("x", 1, 2), content("y", 3, 4)],
        );
        let b = Diff::new(
            "cluster",
            signature(),
            vec![content("y", 3, 4), content("x", 1, 2)],
        );
        assert!(a.same_fields(&b));
        assert!(a.matches(&b));
    }

    #[test]
    fn test_different_fields_do_not_match() {
        let a = Diff::new("cluster", signature(), vec![content("x", 1, 2)]);
        let b = Diff::new("cluster", signature(), vec![content("x", 1, 5)]);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_matches_requires_same_signature() {
        let a = Diff::new("cluster", signature(), vec![content("x", 1, 2)]);
        let b = Diff::new(
            "cluster",
            IntentfulSignature::new("x", "http://provider/x", "http://provider"),
            vec![content("x", 1, 2)],
        );
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_handler_url_not_serialized_when_absent() {
        let diff = Diff::new("cluster", signature(), vec![content("x", 1, 2)]);
        let wire = serde_json::to_value(&diff).unwrap();
        assert!(wire.get("handler_url").is_none());
    }
}
