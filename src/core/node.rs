//! Context tree values
//!
//! The personal context is one `ContextNode::Object` addressed by
//! dot-separated paths such as `preferences.domains.furniture`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered map of child nodes
pub type NodeMap = BTreeMap<String, ContextNode>;

/// A value in the context tree
///
/// Serializes to plain JSON (untagged), so `{"a": [1, "x"]}` round-trips
/// through serde_json without wrapper objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ContextNode {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ContextNode>),
    Object(NodeMap),
}

impl ContextNode {
    /// Create an empty object node
    pub fn object() -> Self {
        ContextNode::Object(NodeMap::new())
    }

    /// Check if this node is an object
    pub fn is_object(&self) -> bool {
        matches!(self, ContextNode::Object(_))
    }

    /// Check if this node is a scalar (not an array or object)
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ContextNode::Array(_) | ContextNode::Object(_))
    }

    /// Borrow the child map if this is an object
    pub fn as_object(&self) -> Option<&NodeMap> {
        match self {
            ContextNode::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the child map if this is an object
    pub fn as_object_mut(&mut self) -> Option<&mut NodeMap> {
        match self {
            ContextNode::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Walk a dot-separated path through object keys
    ///
    /// Returns `None` on a missing key or when a non-object is indexed.
    pub fn get_path(&self, path: &str) -> Option<&ContextNode> {
        path.split('.').try_fold(self, |node, segment| match node {
            ContextNode::Object(map) => map.get(segment),
            _ => None,
        })
    }

    /// Convert to a `serde_json::Value`
    pub fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

impl From<Value> for ContextNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ContextNode::Null,
            Value::Bool(b) => ContextNode::Bool(b),
            // serde_json numbers always fit an f64 (possibly lossy for huge ints)
            Value::Number(n) => ContextNode::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => ContextNode::String(s),
            Value::Array(items) => {
                ContextNode::Array(items.into_iter().map(ContextNode::from).collect())
            }
            Value::Object(map) => ContextNode::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ContextNode::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ContextNode> for Value {
    fn from(node: ContextNode) -> Self {
        match node {
            ContextNode::Null => Value::Null,
            ContextNode::Bool(b) => Value::Bool(b),
            ContextNode::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            ContextNode::String(s) => Value::String(s),
            ContextNode::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            ContextNode::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ContextNode {
    fn from(s: &str) -> Self {
        ContextNode::String(s.to_string())
    }
}

impl From<String> for ContextNode {
    fn from(s: String) -> Self {
        ContextNode::String(s)
    }
}

impl From<bool> for ContextNode {
    fn from(b: bool) -> Self {
        ContextNode::Bool(b)
    }
}

impl From<f64> for ContextNode {
    fn from(n: f64) -> Self {
        ContextNode::Number(n)
    }
}

impl fmt::Display for ContextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Validate a dot-path used on the administrative surface
///
/// A path is non-empty and has no empty segments. `"*"` is accepted as the
/// wildcard section.
pub fn is_valid_path(path: &str) -> bool {
    path == "*" || (!path.is_empty() && path.split('.').all(|segment| !segment.trim().is_empty()))
}
