//! Identifier reconciliation between placeholder and server-assigned ids.
//!
//! When an entity is created offline it gets a placeholder id. Once the
//! create syncs, the server returns the authoritative id and the mapping is
//! recorded here. Before any later mutation is sent, its payload is rewritten
//! so the server never sees a placeholder it does not know.

use crate::{error::Result, is_placeholder, EntityId, Error};
use serde_json::Value;
use std::collections::HashMap;

/// Maps client-generated placeholder ids to server-assigned ids.
///
/// A placeholder, once mapped, is never remapped. Any mutation that still
/// references an unmapped placeholder logically depends on the create with
/// that id and must not be sent until the mapping exists.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationTable {
    mappings: HashMap<EntityId, EntityId>,
}

impl ReconciliationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placeholder -> server id mapping.
    ///
    /// Recording the same mapping twice is a no-op; mapping an already-mapped
    /// placeholder to a different id is an error.
    pub fn record_mapping(
        &mut self,
        placeholder: impl Into<EntityId>,
        server_id: impl Into<EntityId>,
    ) -> Result<()> {
        let placeholder = placeholder.into();
        let server_id = server_id.into();

        match self.mappings.get(&placeholder) {
            Some(existing) if *existing == server_id => Ok(()),
            Some(existing) => Err(Error::PlaceholderRemapped {
                placeholder,
                existing: existing.clone(),
                requested: server_id,
            }),
            None => {
                self.mappings.insert(placeholder, server_id);
                Ok(())
            }
        }
    }

    /// Resolve an id to its server-assigned form, or itself if unmapped.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.mappings.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Rewrite every mapped placeholder embedded in a payload.
    ///
    /// Walks the JSON value and replaces any string that is a mapped
    /// placeholder, at any nesting depth. Unmapped placeholders are left
    /// untouched; [`has_unmapped_placeholder`](Self::has_unmapped_placeholder)
    /// gates whether the payload may be sent at all.
    pub fn rewrite_payload(&self, payload: &mut Value) {
        match payload {
            Value::String(s) => {
                if let Some(mapped) = self.mappings.get(s.as_str()) {
                    *s = mapped.clone();
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.rewrite_payload(item);
                }
            }
            Value::Object(map) => {
                for value in map.values_mut() {
                    self.rewrite_payload(value);
                }
            }
            _ => {}
        }
    }

    /// Whether the payload still references a placeholder with no mapping.
    pub fn has_unmapped_placeholder(&self, payload: &Value) -> bool {
        match payload {
            Value::String(s) => is_placeholder(s) && !self.mappings.contains_key(s.as_str()),
            Value::Array(items) => items.iter().any(|v| self.has_unmapped_placeholder(v)),
            Value::Object(map) => map.values().any(|v| self.has_unmapped_placeholder(v)),
            _ => false,
        }
    }

    /// Number of recorded mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether no mappings have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_unmapped_is_identity() {
        let table = ReconciliationTable::new();
        assert_eq!(table.resolve("local-1"), "local-1");
        assert_eq!(table.resolve("42"), "42");
    }

    #[test]
    fn record_and_resolve() {
        let mut table = ReconciliationTable::new();
        table.record_mapping("local-1", "42").unwrap();
        assert_eq!(table.resolve("local-1"), "42");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remap_same_target_is_noop() {
        let mut table = ReconciliationTable::new();
        table.record_mapping("local-1", "42").unwrap();
        table.record_mapping("local-1", "42").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remap_different_target_rejected() {
        let mut table = ReconciliationTable::new();
        table.record_mapping("local-1", "42").unwrap();

        let result = table.record_mapping("local-1", "43");
        assert!(matches!(result, Err(Error::PlaceholderRemapped { .. })));
        assert_eq!(table.resolve("local-1"), "42");
    }

    #[test]
    fn rewrite_top_level_id() {
        let mut table = ReconciliationTable::new();
        table.record_mapping("local-1", "42").unwrap();

        let mut payload = json!({"id": "local-1", "price": 5});
        table.rewrite_payload(&mut payload);
        assert_eq!(payload, json!({"id": "42", "price": 5}));
    }

    #[test]
    fn rewrite_nested_references() {
        let mut table = ReconciliationTable::new();
        table.record_mapping("local-p1", "101").unwrap();

        let mut payload = json!({
            "id": "order-7",
            "lines": [
                {"productId": "local-p1", "qty": 2},
                {"productId": "55", "qty": 1}
            ]
        });
        table.rewrite_payload(&mut payload);

        assert_eq!(payload["lines"][0]["productId"], "101");
        assert_eq!(payload["lines"][1]["productId"], "55");
    }

    #[test]
    fn rewrite_leaves_unmapped_placeholders() {
        let table = ReconciliationTable::new();
        let mut payload = json!({"id": "local-1"});
        table.rewrite_payload(&mut payload);
        assert_eq!(payload["id"], "local-1");
    }

    #[test]
    fn unmapped_placeholder_detection() {
        let mut table = ReconciliationTable::new();
        assert!(table.has_unmapped_placeholder(&json!({"id": "local-1"})));
        assert!(table.has_unmapped_placeholder(&json!({"refs": ["ok", "local-9"]})));
        assert!(!table.has_unmapped_placeholder(&json!({"id": "42", "n": 1})));

        table.record_mapping("local-1", "42").unwrap();
        assert!(!table.has_unmapped_placeholder(&json!({"id": "local-1"})));
    }
}
