//! Schema-driven stripping of status-only fields.
//!
//! Providers mark schema subtrees that only ever appear on the status side
//! (computed or observed fields). Those subtrees are removed from the
//! status document before diffing so they never surface as discrepancies.

use serde_json::Value;

use converge_core::Status;

/// Schema extension marking a subtree as present only on the status side.
pub const STATUS_ONLY_MARKER: &str = "x-status-only";

/// Return a copy of `status` with every schema subtree flagged
/// status-only removed. Array elements left empty by the stripping are
/// filtered out.
#[must_use]
pub fn remove_status_only_fields(schema: &Value, status: &Status) -> Status {
    let mut stripped = status.clone();
    strip(schema, &mut stripped);
    stripped
}

fn strip(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(map) => {
            let properties = schema.get("properties");
            let mut removed = Vec::new();
            for (field, child) in map.iter_mut() {
                let Some(child_schema) = properties.and_then(|p| p.get(field)) else {
                    continue;
                };
                if is_status_only(child_schema) {
                    removed.push(field.clone());
                } else {
                    strip(child_schema, child);
                }
            }
            for field in removed {
                map.remove(&field);
            }
        }
        Value::Array(elements) => {
            if let Some(items) = schema.get("items") {
                for element in elements.iter_mut() {
                    strip(items, element);
                }
                elements.retain(|element| {
                    !element.as_object().is_some_and(serde_json::Map::is_empty)
                });
            }
        }
        _ => {}
    }
}

fn is_status_only(schema: &Value) -> bool {
    schema
        .get(STATUS_ONLY_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
