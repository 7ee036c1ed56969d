//! Dotted-path access into nested JSON objects.
//!
//! Only objects are walked; arrays and primitives end a lookup.

use serde_json::{Map, Value};

/// Split a full scope path `key.rest.of.path` into its scope key and the
/// remaining nested path.
pub fn split_scope_path(full_path: &str) -> (&str, Option<&str>) {
    match full_path.split_once('.') {
        Some((key, rest)) => (key, Some(rest)),
        None => (full_path, None),
    }
}

/// Walk `path` through nested objects under `root`.
///
/// Returns `None` as soon as a segment is missing or a parent is not an object.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Resolve a full `key.path` against a scope map.
pub fn lookup<'a>(scope: &'a Map<String, Value>, full_path: &str) -> Option<&'a Value> {
    let (key, path) = split_scope_path(full_path);
    let value = scope.get(key)?;
    match path {
        Some(path) => get_path(value, path),
        None => Some(value),
    }
}

/// Write `value` at `path` under `root`, creating objects along the way.
///
/// Any intermediate that exists but is not an object (including `root`
/// itself) is replaced by an empty object. The returned list names every
/// location overwritten that way, relative to `root` (`""` is `root`).
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Vec<String> {
    let segments: Vec<&str> = path.split('.').collect();
    let last = segments.len() - 1;
    let mut coerced = Vec::new();
    let mut current = root;

    for (index, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            coerced.push(segments[..index].join("."));
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            break;
        };
        if index == last {
            map.insert((*segment).to_string(), value);
            return coerced;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    coerced
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_scope_path() {
        assert_eq!(split_scope_path("greeting"), ("greeting", None));
        assert_eq!(split_scope_path("user.name.first"), ("user", Some("name.first")));
    }

    #[test]
    fn test_get_path_stops_at_missing_or_non_object() {
        let root = json!({"a": {"b": 1, "list": [1, 2]}, "s": "text"});
        assert_eq!(get_path(&root, "a.b"), Some(&json!(1)));
        assert_eq!(get_path(&root, "a.missing.deep"), None);
        assert_eq!(get_path(&root, "s.len"), None);
        assert_eq!(get_path(&root, "a.list.0"), None);
    }

    #[test]
    fn test_set_path_creates_intermediates_and_keeps_siblings() {
        let mut root = json!({"a": {"keep": true}});
        let coerced = set_path(&mut root, "a.b.c", json!(5));
        assert!(coerced.is_empty());
        assert_eq!(root, json!({"a": {"keep": true, "b": {"c": 5}}}));
    }

    #[test]
    fn test_set_path_reports_destructive_coercion() {
        let mut root = json!({"a": 3});
        let coerced = set_path(&mut root, "a.b", json!("x"));
        assert_eq!(coerced, vec!["a".to_string()]);
        assert_eq!(root, json!({"a": {"b": "x"}}));

        let mut scalar = json!("plain");
        let coerced = set_path(&mut scalar, "x", json!(1));
        assert_eq!(coerced, vec![String::new()]);
        assert_eq!(scalar, json!({"x": 1}));
    }

    #[test]
    fn test_lookup_resolves_key_and_nested_path() {
        let scope = json!({"user": {"name": "Ada"}, "n": 2});
        let scope = scope.as_object().expect("object");
        assert_eq!(lookup(scope, "user.name"), Some(&json!("Ada")));
        assert_eq!(lookup(scope, "n"), Some(&json!(2)));
        assert_eq!(lookup(scope, "missing"), None);
    }
}
