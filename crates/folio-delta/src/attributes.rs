//! Formatting attributes carried by insert and retain ops.
//!
//! Attribute values are arbitrary JSON. On a retain, a `null` value means
//! "remove this attribute"; composition onto an insert drops it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An ordered map of attribute name to value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, Value>);

impl AttributeMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compose `b` on top of `a`.
///
/// Keys of `b` win. With `keep_null` unset, `null` values are removed from the
/// result instead of being carried as removal markers.
pub fn compose(a: &AttributeMap, b: &AttributeMap, keep_null: bool) -> AttributeMap {
    let mut attributes: BTreeMap<String, Value> = b
        .iter()
        .filter(|(_, value)| keep_null || !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (key, value) in a.iter() {
        if !b.contains_key(key) {
            attributes.insert(key.clone(), value.clone());
        }
    }

    AttributeMap(attributes)
}

/// Attributes that undo `attr` when applied over text formatted with `base`.
pub fn invert(attr: &AttributeMap, base: &AttributeMap) -> AttributeMap {
    let mut inverted = BTreeMap::new();

    for (key, base_value) in base.iter() {
        if let Some(value) = attr.get(key) {
            if value != base_value {
                inverted.insert(key.clone(), base_value.clone());
            }
        }
    }

    for (key, value) in attr.iter() {
        if !base.contains_key(key) && !value.is_null() {
            inverted.insert(key.clone(), Value::Null);
        }
    }

    AttributeMap(inverted)
}

/// Rewrite `b` so it applies after `a`.
///
/// With `priority`, keys already set by `a` are dropped from `b`.
pub fn transform(a: &AttributeMap, b: &AttributeMap, priority: bool) -> AttributeMap {
    if a.is_empty() || b.is_empty() || !priority {
        return b.clone();
    }

    b.iter()
        .filter(|(key, _)| !a.contains_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
