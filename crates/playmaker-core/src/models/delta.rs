//! Payload deltas shared by optimistic mutations and push events

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A change to a resource payload.
///
/// Deltas are never inverted: rolling one back recomputes the visible payload
/// from the last confirmed state plus the deltas still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Delta {
    /// JSON merge patch (`null` removes a key, objects merge recursively)
    Merge { patch: Value },
    /// Integer add at an object path; a missing or non-integer leaf counts as 0
    Increment { path: Vec<String>, by: i64 },
    /// Push an item onto the array at an object path
    Append { path: Vec<String>, item: Value },
}

impl Delta {
    pub const fn merge(patch: Value) -> Self {
        Self::Merge { patch }
    }

    pub fn increment<I, S>(path: I, by: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Increment {
            path: path.into_iter().map(Into::into).collect(),
            by,
        }
    }

    pub fn append<I, S>(path: I, item: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Append {
            path: path.into_iter().map(Into::into).collect(),
            item,
        }
    }

    /// Apply the delta in place. Never fails: a node of the wrong type on the
    /// path is replaced.
    pub fn apply(&self, target: &mut Value) {
        match self {
            Self::Merge { patch } => merge_patch(target, patch),
            Self::Increment { path, by } => {
                let slot = slot_mut(target, path);
                let current = slot.as_i64().unwrap_or(0);
                *slot = Value::from(current.saturating_add(*by));
            }
            Self::Append { path, item } => {
                let slot = slot_mut(target, path);
                if let Value::Array(items) = slot {
                    items.push(item.clone());
                } else {
                    *slot = Value::Array(vec![item.clone()]);
                }
            }
        }
    }

    /// Return `base` with the delta applied
    #[must_use]
    pub fn applied_to(&self, base: &Value) -> Value {
        let mut value = base.clone();
        self.apply(&mut value);
        value
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}

/// Walk `path` through nested objects, creating them as needed.
fn slot_mut<'a>(target: &'a mut Value, path: &[String]) -> &'a mut Value {
    path.iter().fold(target, |node, key| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
            other => other,
        }
    })
}
