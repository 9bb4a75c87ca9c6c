//! Path-addressed context store
//!
//! Holds the personal context tree and provides get/set by dot-path, deep
//! merge of partial updates, and projection onto a set of sections.

use std::collections::BTreeSet;

use crate::core::{ContextNode, NodeMap};

/// Wildcard section that selects the whole tree
pub const WILDCARD: &str = "*";

/// The hierarchical context tree
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStore {
    root: ContextNode,
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            root: ContextNode::object(),
        }
    }

    /// Create a store from an existing tree
    ///
    /// A non-object root is replaced by an empty object.
    pub fn with_root(root: ContextNode) -> Self {
        if root.is_object() {
            Self { root }
        } else {
            Self::new()
        }
    }

    /// Borrow the whole tree
    pub fn root(&self) -> &ContextNode {
        &self.root
    }

    /// Look up a value by dot-path
    pub fn get(&self, path: &str) -> Option<&ContextNode> {
        self.root.get_path(path)
    }

    /// Set a value by dot-path
    ///
    /// Intermediate objects are created as needed; a non-object met on the
    /// way is replaced by an object. The terminal value is overwritten, not
    /// merged.
    pub fn set(&mut self, path: &str, value: ContextNode) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut node = &mut self.root;
        for segment in segments {
            if !node.is_object() {
                *node = ContextNode::object();
            }
            let ContextNode::Object(map) = node else {
                unreachable!("node was just made an object");
            };
            node = map.entry(segment.to_string()).or_insert_with(ContextNode::object);
        }

        if !node.is_object() {
            *node = ContextNode::object();
        }
        if let ContextNode::Object(map) = node {
            map.insert(last.to_string(), value);
        }
    }

    /// Deep-merge `update` into the root and return the new root
    pub fn merge(&mut self, update: ContextNode) -> &ContextNode {
        let root = std::mem::take(&mut self.root);
        self.root = deep_merge(root, update);
        if !self.root.is_object() {
            self.root = ContextNode::object();
        }
        &self.root
    }

    /// Project the requested sections, preserving their path shape
    ///
    /// An empty list or a `"*"` entry returns the whole tree. Paths that do
    /// not resolve are skipped. A path nested under another requested path
    /// is already covered by it and contributes nothing.
    pub fn filter(&self, sections: &[String]) -> ContextNode {
        if sections.is_empty() || sections.iter().any(|s| s == WILDCARD) {
            return self.root.clone();
        }

        let mut projected = ContextStore::new();
        for section in outermost_paths(sections) {
            if let Some(value) = self.get(section) {
                projected.set(section, value.clone());
            }
        }
        projected.root
    }

    /// Every path reachable through object keys, depth first
    ///
    /// Array contents are not expanded.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(map) = self.root.as_object() {
            collect_keys(map, "", &mut keys);
        }
        keys
    }

    /// Top-level section names
    pub fn top_level_keys(&self) -> Vec<String> {
        self.root
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

// Requested paths with duplicates and descendants of other entries removed
fn outermost_paths(sections: &[String]) -> Vec<&str> {
    let unique: BTreeSet<&str> = sections.iter().map(String::as_str).collect();
    unique
        .iter()
        .copied()
        .filter(|path| {
            !unique.iter().any(|ancestor| {
                path.strip_prefix(ancestor)
                    .is_some_and(|rest| rest.starts_with('.'))
            })
        })
        .collect()
}

fn collect_keys(map: &NodeMap, prefix: &str, keys: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        keys.push(path.clone());
        if let ContextNode::Object(children) = value {
            collect_keys(children, &path, keys);
        }
    }
}

/// Deep merge two nodes
///
/// - Object x Object: merge key by key
/// - Array x Array of scalars: set union, keeping first-seen order
/// - Array x Array containing objects: concatenate (no dedup)
/// - anything else: the update replaces the target
pub fn deep_merge(target: ContextNode, update: ContextNode) -> ContextNode {
    match (target, update) {
        (ContextNode::Object(mut target_map), ContextNode::Object(update_map)) => {
            for (key, update_val) in update_map {
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, update_val),
                    None => update_val,
                };
                target_map.insert(key, merged);
            }
            ContextNode::Object(target_map)
        }
        (ContextNode::Array(mut target_items), ContextNode::Array(update_items)) => {
            let all_scalar = target_items.iter().chain(update_items.iter()).all(ContextNode::is_scalar);
            if all_scalar {
                for item in update_items {
                    if !target_items.contains(&item) {
                        target_items.push(item);
                    }
                }
            } else {
                // Known limitation: re-merging the same object array duplicates it
                target_items.extend(update_items);
            }
            ContextNode::Array(target_items)
        }
        (_, update) => update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> ContextNode {
        ContextNode::from(value)
    }

    fn sample() -> ContextStore {
        ContextStore::with_root(node(json!({
            "preferences": {
                "domains": { "furniture": "modern", "travel": "budget" },
                "values": { "sustainability": "high" }
            },
            "identity": { "name": "Sam" },
            "history": [ { "item": "desk" } ]
        })))
    }

    #[test]
    fn test_get_missing_is_absent() {
        let store = sample();
        assert!(store.get("preferences.domains.cars").is_none());
        assert!(store.get("identity.name.first").is_none());
        assert!(store.get("nope.nope").is_none());
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut store = ContextStore::new();
        store.set("a.b.c", ContextNode::from(1.0));
        assert_eq!(store.get("a.b.c"), Some(&ContextNode::Number(1.0)));

        // Overwrites rather than merges
        store.set("a.b", node(json!({ "d": true })));
        assert!(store.get("a.b.c").is_none());
        assert_eq!(store.get("a.b.d"), Some(&ContextNode::Bool(true)));
    }

    #[test]
    fn test_set_through_scalar_replaces_it() {
        let mut store = sample();
        store.set("identity.name.first", ContextNode::from("Sam"));
        assert_eq!(store.get("identity.name.first"), Some(&ContextNode::from("Sam")));
    }

    #[test]
    fn test_merge_write_then_get() {
        let mut store = ContextStore::new();
        store.merge(node(json!({ "preferences": { "values": { "sustainability": "high" } } })));
        assert_eq!(
            store.get("preferences.values.sustainability"),
            Some(&ContextNode::from("high"))
        );
    }

    #[test]
    fn test_merge_idempotent_for_scalars_and_objects() {
        let base = node(json!({ "a": { "b": 1, "c": "x" }, "tags": ["eco", "local"] }));
        let update = node(json!({ "a": { "b": 2, "d": { "e": null } }, "tags": ["local", "vegan"] }));

        let once = deep_merge(base.clone(), update.clone());
        let twice = deep_merge(once.clone(), update);
        assert_eq!(once, twice);
        assert_eq!(
            once.get_path("tags"),
            Some(&node(json!(["eco", "local", "vegan"])))
        );
    }

    #[test]
    fn test_merge_object_arrays_concatenate() {
        let base = node(json!({ "history": [ { "item": "desk" } ] }));
        let update = node(json!({ "history": [ { "item": "desk" } ] }));

        let merged = deep_merge(base, update);
        assert_eq!(
            merged.get_path("history"),
            Some(&node(json!([ { "item": "desk" }, { "item": "desk" } ])))
        );
    }

    #[test]
    fn test_merge_type_mismatch_replaces() {
        let merged = deep_merge(node(json!({ "a": { "b": 1 } })), node(json!({ "a": "flat" })));
        assert_eq!(merged, node(json!({ "a": "flat" })));
    }

    #[test]
    fn test_filter_preserves_shape() {
        let store = sample();
        let projected = store.filter(&["preferences.domains.furniture".to_string()]);
        assert_eq!(
            projected,
            node(json!({ "preferences": { "domains": { "furniture": "modern" } } }))
        );
    }

    #[test]
    fn test_filter_sibling_sections_combine() {
        let store = sample();
        let projected = store.filter(&[
            "preferences.domains.furniture".to_string(),
            "preferences.values".to_string(),
            "missing.section".to_string(),
        ]);
        assert_eq!(
            projected,
            node(json!({
                "preferences": {
                    "domains": { "furniture": "modern" },
                    "values": { "sustainability": "high" }
                }
            }))
        );
    }

    #[test]
    fn test_filter_nested_section_is_not_duplicated() {
        let mut store = ContextStore::new();
        store.merge(node(json!({ "a": { "b": { "hist": [ { "x": 1 } ] }, "c": 2 } })));
        let expected = node(json!({ "a": { "b": { "hist": [ { "x": 1 } ] }, "c": 2 } }));

        for sections in [["a", "a.b"], ["a.b", "a"]] {
            let sections: Vec<String> = sections.iter().map(|s| s.to_string()).collect();
            assert_eq!(store.filter(&sections), expected);
        }

        // A shared name prefix is not nesting
        let projected = store.filter(&["a.b".to_string(), "a.bb".to_string(), "a.b".to_string()]);
        assert_eq!(projected, node(json!({ "a": { "b": { "hist": [ { "x": 1 } ] } } })));
    }

    #[test]
    fn test_filter_wildcard_returns_all() {
        let store = sample();
        assert_eq!(&store.filter(&["*".to_string()]), store.root());
        assert_eq!(&store.filter(&[]), store.root());
    }

    #[test]
    fn test_all_keys_depth_first() {
        let store = sample();
        assert_eq!(
            store.all_keys(),
            vec![
                "history",
                "identity",
                "identity.name",
                "preferences",
                "preferences.domains",
                "preferences.domains.furniture",
                "preferences.domains.travel",
                "preferences.values",
                "preferences.values.sustainability",
            ]
        );
    }
}
