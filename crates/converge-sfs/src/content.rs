//! Field-level diff output shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One matched field-level discrepancy between a spec and a status document.
///
/// The value sides are arrays because a selector may match several array
/// elements under the same correlating keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffContent {
    /// Correlating identifiers collected by vector selectors
    /// (e.g. an array element's id), keyed by the id path.
    pub keys: Map<String, Value>,

    /// The last projected field name; empty when projection fell through
    /// to a parent value.
    pub key: String,

    /// Matched values on the spec side.
    #[serde(rename = "spec-val")]
    pub spec_val: Vec<Value>,

    /// Matched values on the status side.
    #[serde(rename = "status-val")]
    pub status_val: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_uses_hyphenated_fields() {
        let content = DiffContent {
            keys: Map::new(),
            key: "x".to_string(),
            spec_val: vec![json!(10)],
            status_val: vec![json!(15)],
        };
        let wire = serde_json::to_value(&content).unwrap();
        assert_eq!(wire["spec-val"], json!([10]));
        assert_eq!(wire["status-val"], json!([15]));
        assert_eq!(wire["key"], json!("x"));
    }

    #[test]
    fn test_round_trips_keys() {
        let mut keys = Map::new();
        keys.insert("id".to_string(), json!(1));
        let content = DiffContent {
            keys,
            key: "v".to_string(),
            spec_val: vec![json!(1)],
            status_val: vec![json!(2)],
        };
        let wire = serde_json::to_string(&content).unwrap();
        let back: DiffContent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, content);
    }
}
