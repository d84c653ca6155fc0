//! Extractor: reads a model back out of markup.
//!
//! Walks the same [`Mapping`] the compiler uses, in the opposite direction.
//! Non-repeat rules read the first matching element; repeat rules reset the
//! bound path to `[]` and append one sub-model per matching element, in
//! document order.

use dom_query::NodeRef;
use serde_json::{Map, Value};

use crate::html::{self, HtmlTree};
use crate::keypath::{DynamicKeys, KeyPath};
use crate::mapping::{AttrBinding, ClassToken, Mapping, Rule};
use crate::{ExtractOptions, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the leaf; `None` removes it.
    Set,
    /// Append to the array at the leaf, creating it when needed.
    Push,
}

/// Write `value` into `parent` at `key_path`, the dual of
/// [`crate::runtime::resolve`].
///
/// Intermediate steps that are neither objects nor arrays are replaced with
/// `{}`. String values lose a trailing line break and whatever whitespace
/// follows it. Under `JSON(...)` the string is parsed; invalid JSON removes
/// the leaf.
pub fn set_value(
    parent: &mut Value,
    key_path: &str,
    value: Option<Value>,
    mode: WriteMode,
    dynamic_keys: &DynamicKeys,
) {
    let key_path = KeyPath::parse(key_path, dynamic_keys);
    let value = value.map(|value| match value {
        Value::String(s) => Value::String(trim_trailing_break(&s).to_string()),
        other => other,
    });
    let value = if key_path.json {
        value.and_then(|value| match value {
            Value::String(s) => serde_json::from_str(&s).ok(),
            other => Some(other),
        })
    } else {
        value
    };

    if key_path.is_this() {
        write(parent, value, mode);
        return;
    }

    let segments: Vec<&str> = key_path.segments().collect();
    let Some((last, intermediate)) = segments.split_last() else {
        return;
    };

    let mut current = parent;
    for segment in intermediate {
        let next = slot(current, segment);
        if !(next.is_object() || next.is_array()) {
            *next = Value::Object(Map::new());
        }
        current = next;
    }

    match (mode, value) {
        (WriteMode::Set, None) => {
            if let Value::Object(map) = current {
                map.remove(*last);
            }
        }
        (mode, value) => write(slot(current, last), value, mode),
    }
}

fn write(target: &mut Value, value: Option<Value>, mode: WriteMode) {
    let value = value.unwrap_or(Value::Null);
    match (mode, target) {
        (WriteMode::Set, target) => *target = value,
        (WriteMode::Push, Value::Array(items)) => items.push(value),
        (WriteMode::Push, target) => *target = Value::Array(vec![value]),
    }
}

/// The child at `segment`, created as `null` when missing. Arrays accept
/// in-range numeric segments; anything else becomes an object.
fn slot<'v>(current: &'v mut Value, segment: &str) -> &'v mut Value {
    let index = match &*current {
        Value::Array(items) => segment.parse::<usize>().ok().filter(|i| *i < items.len()),
        _ => None,
    };
    match (index, current) {
        (Some(i), Value::Array(items)) => &mut items[i],
        (_, current) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            &mut current[segment]
        }
    }
}

fn trim_trailing_break(s: &str) -> &str {
    let content = s.trim_end().len();
    match s[content..].find(|c: char| c == '\n' || c == '\r') {
        Some(at) => &s[..content + at],
        None => s,
    }
}

struct Extractor<'a> {
    dynamic_keys: &'a DynamicKeys,
}

impl Extractor<'_> {
    fn walk<'n>(&self, mapping: &Mapping, find: impl Fn(&str) -> Vec<NodeRef<'n>>, model: &mut Value) {
        for (selector, rule) in &mapping.rules {
            let elements = find(selector);
            if let Some(repeat) = &rule.repeat {
                self.repeat(repeat, rule, &elements, model);
            } else if let Some(first) = elements.first() {
                self.inner_html(rule, first, model);
                self.attrs(rule, first, model);
            }
        }
    }

    fn set(&self, model: &mut Value, key_path: &str, value: Option<Value>) {
        set_value(model, key_path, value, WriteMode::Set, self.dynamic_keys);
    }

    fn inner_html(&self, rule: &Rule, element: &NodeRef<'_>, model: &mut Value) {
        if let Some(path) = &rule.html {
            let value = Value::String(element.inner_html().to_string());
            self.set(model, path, Some(value));
        }
    }

    fn attrs(&self, rule: &Rule, element: &NodeRef<'_>, model: &mut Value) {
        for (name, binding) in &rule.attrs {
            match binding {
                AttrBinding::Path(path) => {
                    self.set(model, path, html::attr(element, name).map(Value::String));
                }
                AttrBinding::Style(properties) => {
                    for (property, path) in properties {
                        let value = html::style_value(element, property).map(Value::String);
                        self.set(model, path, value);
                    }
                }
                AttrBinding::Class(bindings) => {
                    let classes = html::class_list(element);
                    for (token, path) in bindings {
                        self.set(model, path, class_value(token, &classes));
                    }
                }
            }
        }
    }

    fn repeat(&self, path: &str, rule: &Rule, elements: &[NodeRef<'_>], model: &mut Value) {
        self.set(model, path, Some(Value::Array(Vec::new())));
        for element in elements {
            let mut item = Value::Object(Map::new());
            self.inner_html(rule, element, &mut item);
            self.attrs(rule, element, &mut item);
            if let Some(inside) = &rule.inside {
                self.walk(inside, |selector| html::select_within(element, selector), &mut item);
            }
            set_value(model, path, Some(item), WriteMode::Push, self.dynamic_keys);
        }
    }
}

/// Affix tokens collect the matching classes with the affix stripped: one
/// match is a string, several an array, none removes the leaf. Plain tokens
/// read as membership.
fn class_value(token: &ClassToken, classes: &[String]) -> Option<Value> {
    let mut found = match token {
        ClassToken::Plain(name) => return Some(Value::Bool(classes.contains(name))),
        ClassToken::Prefix(affix) => affixed(classes, |class| class.strip_prefix(affix.as_str())),
        ClassToken::Suffix(affix) => affixed(classes, |class| class.strip_suffix(affix.as_str())),
    };
    match found.len() {
        0 => None,
        1 => found.pop(),
        _ => Some(Value::Array(found)),
    }
}

fn affixed<'c>(classes: &'c [String], strip: impl Fn(&'c str) -> Option<&'c str>) -> Vec<Value> {
    classes
        .iter()
        .filter_map(|class| strip(class.as_str()))
        .filter(|rest| !rest.is_empty())
        .map(|rest| Value::String(rest.to_string()))
        .collect()
}

/// Extract a model from `html`.
pub fn extract(html: &str, mapping: &Mapping, options: &ExtractOptions) -> Result<Value, ViewError> {
    let tree = HtmlTree::parse(html, options.normalize_whitespace);
    let mut model = options
        .seed
        .clone()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let extractor = Extractor {
        dynamic_keys: &options.dynamic_keys,
    };
    extractor.walk(mapping, |selector| tree.select(selector), &mut model);

    tracing::debug!(rules = mapping.rules.len(), "extracted model");
    Ok(model)
}

/// [`extract`] on Tokio's blocking pool.
pub async fn extract_async(
    html: String,
    mapping: Mapping,
    options: ExtractOptions,
) -> Result<Value, ViewError> {
    tokio::task::spawn_blocking(move || extract(&html, &mapping, &options))
        .await
        .map_err(|e| ViewError::Task(e.to_string()))?
}
