//! Actions: tagged records delivered to the action sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tagged record such as `{"kind": "INCREMENT"}`.
///
/// Actions are both what sagas dispatch and what triggers them. Equality is
/// structural over the tag and every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Add a field, replacing any previous value under the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Follow a `/`-separated path through nested objects, e.g. `payload/url`.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('/');
        let first = self.fields.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_flat() {
        let action = Action::new("TODOS_RECEIVED").with("todos", json!({}));

        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({ "kind": "TODOS_RECEIVED", "todos": {} })
        );
    }

    #[test]
    fn pointer_walks_nested_payload() {
        let action = Action::new("FETCH_REQUESTED")
            .with("payload", json!({ "url": "https://example.test/a" }));

        assert_eq!(
            action.pointer("payload/url"),
            Some(&json!("https://example.test/a"))
        );
        assert_eq!(action.pointer("payload/missing"), None);
        assert_eq!(action.pointer("nope"), None);
    }

    #[test]
    fn round_trips_through_json() {
        let json = json!({ "kind": "INCREMENT", "by": 2 });
        let action: Action = serde_json::from_value(json).unwrap();

        assert!(action.is("INCREMENT"));
        assert_eq!(action.get("by"), Some(&json!(2)));
    }
}
