//! Runtime helpers called by the render program.
//!
//! - Model path resolution with defaults (`resolve`)
//! - Class list computation (`resolve_class`)
//! - HTML entity encoding (`encode`, `to_text`)

use serde_json::Value;

use crate::keypath::{DynamicKeys, KeyPath, THIS};
use crate::mapping::ClassToken;

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Resolve `key_path` against `parent`.
///
/// Returns `default` when `parent` is null or any step of the path is
/// missing. `JSON(...)` paths return the JSON text of the resolved value.
/// With `encode` set, the result is an HTML-escaped string.
pub fn resolve(
    parent: &Value,
    key_path: &str,
    encode_value: bool,
    default: &Value,
    dynamic_keys: &DynamicKeys,
) -> Value {
    try_resolve(parent, key_path, encode_value, dynamic_keys).unwrap_or_else(|| default.clone())
}

/// [`resolve`] without a default: `None` when `parent` is null or the path
/// is missing.
pub fn try_resolve(
    parent: &Value,
    key_path: &str,
    encode_value: bool,
    dynamic_keys: &DynamicKeys,
) -> Option<Value> {
    if parent.is_null() {
        return None;
    }
    if key_path == THIS {
        return Some(finish(parent, encode_value));
    }

    let key_path = KeyPath::parse(key_path, dynamic_keys);
    let current = lookup(parent, &key_path)?;

    if key_path.json {
        let text = current.to_string();
        Some(if encode_value {
            Value::String(encode(&text))
        } else {
            Value::String(text)
        })
    } else {
        Some(finish(current, encode_value))
    }
}

/// Walk the path one property at a time. Arrays accept numeric segments.
pub(crate) fn lookup<'v>(parent: &'v Value, key_path: &KeyPath<'_>) -> Option<&'v Value> {
    if key_path.is_this() {
        return Some(parent);
    }
    key_path
        .segments()
        .try_fold(parent, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn finish(value: &Value, encode_value: bool) -> Value {
    if encode_value {
        Value::String(encode(&to_text(value)))
    } else {
        value.clone()
    }
}

// ---------------------------------------------------------------------------
// Class lists
// ---------------------------------------------------------------------------

/// Apply one class binding to `classes`.
///
/// `prefix(X)` / `suffix(X)` add `X + value` / `value + X` for every
/// non-empty value (a scalar counts as a one-element list). A plain token is
/// added on `true`, removed on `false` and left alone otherwise.
pub fn resolve_class(
    model: &Value,
    class_name: &str,
    key_path: &str,
    classes: Vec<String>,
    dynamic_keys: &DynamicKeys,
) -> Vec<String> {
    apply_class(model, &ClassToken::parse(class_name), key_path, classes, dynamic_keys)
}

pub(crate) fn apply_class(
    model: &Value,
    token: &ClassToken,
    key_path: &str,
    mut classes: Vec<String>,
    dynamic_keys: &DynamicKeys,
) -> Vec<String> {
    let empty = Value::String(String::new());
    let resolved = resolve(model, key_path, false, &empty, dynamic_keys);

    match token {
        ClassToken::Prefix(affix) => {
            for value in as_list(&resolved).into_iter().filter(|v| is_truthy(v)) {
                push_unique(&mut classes, format!("{}{}", affix, to_text(value)));
            }
        }
        ClassToken::Suffix(affix) => {
            for value in as_list(&resolved).into_iter().filter(|v| is_truthy(v)) {
                push_unique(&mut classes, format!("{}{}", to_text(value), affix));
            }
        }
        ClassToken::Plain(name) => match resolved {
            Value::Bool(true) => push_unique(&mut classes, name.clone()),
            Value::Bool(false) => classes.retain(|c| c != name),
            _ => {}
        },
    }
    classes
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn push_unique(classes: &mut Vec<String>, class: String) {
    if !classes.contains(&class) {
        classes.push(class);
    }
}

/// Empty strings, `false`, `0` and `null` are skipped as class values.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// String form of a model value as it appears in markup.
///
/// `null` renders empty, arrays join their items with `,`, objects render
/// as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Escape `&`, `"`, `'`, `>` and `<` to named entities.
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '>' => out.push_str("&gt;"),
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
