//! Template rendering
//!
//! Resolves `{{key}}` and `{{key.path}}` placeholders against a scope snapshot.
//! Placeholders that resolve to nothing stay in the output verbatim, braces
//! included. An unterminated `{{` and everything after it is copied as is.

use serde_json::Value;

use crate::store::{path, Scope};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Render a template string against `scope`.
pub fn render(template: &str, scope: &Scope) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        rendered.push_str(&rest[..start]);
        match resolve(&after_open[..end], scope) {
            Some(text) => rendered.push_str(&text),
            None => rendered.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    rendered.push_str(rest);
    rendered
}

/// Render every string inside a JSON value; other leaves are copied.
pub fn render_value(value: &Value, scope: &Scope) -> Value {
    match value {
        Value::String(text) => Value::String(render(text, scope)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Scope paths referenced by the well-formed placeholders of `template`.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let token = after_open[..end].trim();
        if !token.is_empty() {
            found.push(token.to_string());
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    found
}

/// Textual form used when substituting a value.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn resolve(token: &str, scope: &Scope) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    path::lookup(scope, token).map(stringify)
}
