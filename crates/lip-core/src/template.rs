//! Manifest self-templating
//!
//! String values in a manifest may reference other values of the same
//! document with `{{ dotted.path }}`. Paths that do not resolve render as an
//! empty string.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\[\]$-]*)\s*\}\}").expect("valid placeholder regex")
});

/// Render every placeholder in every string of `document`, resolving paths
/// against `document` as it was before rendering.
pub fn render(document: &Value) -> Value {
    render_value(document, document)
}

fn render_value(value: &Value, model: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, model)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, model)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (render_str(k, model), render_value(v, model)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Render the placeholders of a single string.
pub fn render_str(text: &str, model: &Value) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| match lookup(model, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

/// Resolve `a.b.0.c` (or `a.b[0].c`) against `model`.
pub fn lookup<'a>(model: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    normalized
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(model, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
