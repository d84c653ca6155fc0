//! KeyPath parsing.
//!
//! A key path is a dotted property path into the model (`a.b.c`) with three
//! special forms:
//!
//! - `this`: the current value itself.
//! - `JSON(path)`: the value is (de)serialized as JSON at that position.
//! - `{name}` segments: substituted from [`DynamicKeys`] before walking,
//!   falling back to `name` when the key is absent or empty.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Placeholder name → replacement text.
pub type DynamicKeys = HashMap<String, String>;

/// Literal key path binding the current value.
pub const THIS: &str = "this";

static DYNAMIC_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("Invalid dynamic key regex"));

/// A key path with its `JSON(...)` wrapper removed and placeholders substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath<'a> {
    pub path: Cow<'a, str>,
    pub json: bool,
}

impl<'a> KeyPath<'a> {
    pub fn parse(raw: &'a str, dynamic_keys: &DynamicKeys) -> Self {
        let (inner, json) = match strip_call(raw, "json") {
            Some(inner) => (inner, true),
            None => (raw, false),
        };
        KeyPath {
            path: substitute(inner, dynamic_keys),
            json,
        }
    }

    pub fn is_this(&self) -> bool {
        self.path == THIS
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }
}

/// Replace every `{name}` with its dynamic key value.
pub fn substitute<'a>(path: &'a str, dynamic_keys: &DynamicKeys) -> Cow<'a, str> {
    if !path.contains('{') {
        return Cow::Borrowed(path);
    }
    DYNAMIC_KEY_RE.replace_all(path, |caps: &Captures| {
        let name = &caps[1];
        dynamic_keys
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    })
}

/// Match `name(inner)` case-insensitively and return `inner`.
pub(crate) fn strip_call<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let head = raw.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let inner = raw[name.len()..].strip_prefix('(')?.strip_suffix(')')?;
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}
