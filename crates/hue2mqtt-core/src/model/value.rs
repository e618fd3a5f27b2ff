//! Recursive operations on dynamic JSON state trees.
//!
//! Device state arrives as partial JSON objects of unpredictable
//! depth. Two operations cover everything the bridge needs: merging a
//! partial update into a canonical tree, and flattening a tree into
//! per-leaf topic paths.

use serde_json::Value;

/// Deep-merge `patch` into `dest`.
///
/// Objects merge key-wise; arrays and scalars replace the destination
/// wholesale. A coordinate pair like `"xy": [0.4, 0.2]` is one value,
/// not two independently-updatable halves.
pub fn merge(dest: &mut Value, patch: &Value) {
    match (dest, patch) {
        (Value::Object(dest_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match dest_map.get_mut(key) {
                    Some(existing) => merge(existing, patch_value),
                    None => {
                        dest_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (dest, patch) => {
            *dest = patch.clone();
        }
    }
}

/// Flatten a tree into `(path, leaf)` pairs, depth-first in key order.
///
/// Path segments are joined with `/`. Arrays count as leaves (they
/// publish as one opaque JSON payload); nulls are dropped entirely.
/// A scalar at the root yields a single pair with an empty path.
pub fn flatten(value: &Value) -> Vec<(String, &Value)> {
    let mut leaves = Vec::new();
    walk(value, String::new(), &mut leaves);
    leaves
}

fn walk<'a>(value: &'a Value, path: String, leaves: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}/{key}")
                };
                walk(child, child_path, leaves);
            }
        }
        leaf => leaves.push((path, leaf)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_updates_only_named_keys() {
        let mut state = json!({"on": true, "bri": 100, "ct": 366});
        merge(&mut state, &json!({"bri": 254}));
        assert_eq!(state, json!({"on": true, "bri": 254, "ct": 366}));
    }

    #[test]
    fn merge_recurses_into_nested_objects() {
        let mut state = json!({"state": {"on": false, "bri": 10}, "name": "Desk"});
        merge(&mut state, &json!({"state": {"on": true}}));
        assert_eq!(state, json!({"state": {"on": true, "bri": 10}, "name": "Desk"}));
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let mut state = json!({"xy": [0.675, 0.322]});
        merge(&mut state, &json!({"xy": [0.167, 0.04]}));
        assert_eq!(state, json!({"xy": [0.167, 0.04]}));
    }

    #[test]
    fn merge_inserts_new_keys() {
        let mut state = json!({"on": true});
        merge(&mut state, &json!({"buttonevent": 1002}));
        assert_eq!(state, json!({"on": true, "buttonevent": 1002}));
    }

    #[test]
    fn flatten_walks_to_scalar_leaves() {
        let tree = json!({"state": {"on": false, "bri": 153}, "name": "Desk"});
        let leaves = flatten(&tree);
        assert_eq!(
            leaves,
            vec![
                ("name".to_owned(), &json!("Desk")),
                ("state/bri".to_owned(), &json!(153)),
                ("state/on".to_owned(), &json!(false)),
            ]
        );
    }

    #[test]
    fn flatten_treats_arrays_as_opaque_leaves() {
        let tree = json!({"state": {"xy": [0.4, 0.2]}});
        let leaves = flatten(&tree);
        assert_eq!(leaves, vec![("state/xy".to_owned(), &json!([0.4, 0.2]))]);
    }

    #[test]
    fn flatten_drops_nulls() {
        let tree = json!({"on": true, "effect": null});
        let leaves = flatten(&tree);
        assert_eq!(leaves, vec![("on".to_owned(), &json!(true))]);
    }
}
