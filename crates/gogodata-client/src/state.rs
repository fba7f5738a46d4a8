//! Interactive state: the JSON blob the host saves with the document.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared handle to the plugin's interactive state.
///
/// Clones share the same underlying object.
#[derive(Debug, Clone, Default)]
pub struct InteractiveState {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl InteractiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state as a JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.inner.lock().clone())
    }

    /// Shallow-merge `patch` on top of the current state.
    ///
    /// Anything other than a JSON object is ignored.
    pub fn merge(&self, patch: &Value) {
        let Value::Object(patch) = patch else {
            if !patch.is_null() {
                tracing::debug!("Ignoring non-object interactive state: {}", patch);
            }
            return;
        };
        let mut state = self.inner.lock();
        for (key, value) in patch {
            state.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_shallow() {
        let state = InteractiveState::new();
        state.merge(&json!({ "board": "GoGo-1", "nested": { "a": 1, "b": 2 } }));
        state.merge(&json!({ "nested": { "a": 3 }, "rows": 10 }));
        assert_eq!(
            state.snapshot(),
            json!({ "board": "GoGo-1", "nested": { "a": 3 }, "rows": 10 })
        );
    }

    #[test]
    fn clones_share_state() {
        let state = InteractiveState::new();
        let other = state.clone();
        other.set("k", json!(1));
        assert_eq!(state.get("k"), Some(json!(1)));
    }

    #[test]
    fn non_objects_are_ignored() {
        let state = InteractiveState::new();
        state.merge(&Value::Null);
        state.merge(&json!([1, 2]));
        assert_eq!(state.snapshot(), json!({}));
    }
}
