//! Helpers for treating a JSON value as the store's hierarchical tree.
//!
//! The store never holds `null` leaves or empty records: writing `null`
//! deletes, and a record whose last child is deleted disappears too.

use serde_json::Map;
use serde_json::Value;

/// Look up the value stored under `segments`.
pub fn get<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Replace the value stored under `segments`, creating intermediate records
/// as needed and pruning records left empty.
pub fn set(root: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = normalize(value);
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else {
        return;
    };

    let mut child = map.remove(*first).unwrap_or(Value::Null);
    set(&mut child, rest, value);
    if !child.is_null() {
        map.insert((*first).to_string(), child);
    }

    let empty = map.is_empty();
    if empty {
        *root = Value::Null;
    }
}

/// Apply each child of `patch` as a point write below `segments`.
pub fn merge(root: &mut Value, segments: &[&str], patch: Map<String, Value>) {
    for (key, value) in patch {
        let mut path = segments.to_vec();
        let children: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        path.extend(children);
        set(root, &path, value);
    }
}

/// Whether a change at one path can affect what is visible at the other,
/// i.e. one is a prefix of the other.
pub fn overlaps(a: &[&str], b: &[&str]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Strip `null` children and empty records.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}
