//! Mapping model.
//!
//! A mapping is an ordered selector → [`Rule`] table, usually written as JSON:
//!
//! ```json
//! {
//!   ".carousel .item": {
//!     "repeat": "banners",
//!     "inside": {
//!       "a":   { "attrs": { "href": "link" } },
//!       "img": { "attrs": { "src": "image" } },
//!       "h4":  { "html": "title" }
//!     }
//!   }
//! }
//! ```
//!
//! Declaration order is preserved (selectors are applied in order, class
//! tokens are added in order).

use serde_json::{Map, Value};

use crate::keypath::strip_call;
use crate::ViewError;

/// Selectors that name composition primitives rather than elements.
pub const RESERVED_SELECTORS: &[&str] = &[
    "partial",
    "widget",
    "container",
    "renderbody",
    "render-body",
    "layout",
];

/// Selectors starting with `_` or `$` are configuration keys.
pub fn is_reserved(selector: &str) -> bool {
    selector.starts_with('_') || selector.starts_with('$') || RESERVED_SELECTORS.contains(&selector)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    pub rules: Vec<(String, Rule)>,
    /// Name under which a partial instance's id is passed as a dynamic key.
    pub base_prop: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub html: Option<String>,
    pub attrs: Vec<(String, AttrBinding)>,
    pub repeat: Option<String>,
    pub inside: Option<Mapping>,
    /// Emit the original markup when the repeat source is empty.
    pub show_default: bool,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            html: None,
            attrs: Vec::new(),
            repeat: None,
            inside: None,
            show_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrBinding {
    /// Whole attribute bound to a key path.
    Path(String),
    /// `style` as CSS property → key path.
    Style(Vec<(String, String)>),
    /// `class` as class token → key path.
    Class(Vec<(ClassToken, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassToken {
    /// `prefix(X)`: adds `X + value` for every value.
    Prefix(String),
    /// `suffix(X)`: adds `value + X` for every value.
    Suffix(String),
    /// Toggled by a boolean.
    Plain(String),
}

impl ClassToken {
    pub fn parse(raw: &str) -> Self {
        if raw.ends_with(')') {
            if let Some(affix) = strip_call(raw, "prefix") {
                return ClassToken::Prefix(affix.to_string());
            }
            if let Some(affix) = strip_call(raw, "suffix") {
                return ClassToken::Suffix(affix.to_string());
            }
        }
        ClassToken::Plain(raw.to_string())
    }
}

impl Mapping {
    /// Parse a mapping. Rules may be wrapped under a `view` key; `baseProp`
    /// is read from the top level or from the wrapped object.
    pub fn from_value(value: &Value) -> Result<Self, ViewError> {
        let top = value
            .as_object()
            .ok_or_else(|| ViewError::InvalidMapping("mapping is not an object".into()))?;

        let view = match top.get("view") {
            Some(Value::Object(view)) => view,
            _ => top,
        };

        let base_prop = top
            .get("baseProp")
            .or_else(|| view.get("baseProp"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Mapping {
            rules: parse_rules(view),
            base_prop,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ViewError> {
        if text.trim().is_empty() {
            return Ok(Mapping::default());
        }
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, selector: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, rule)| rule)
    }
}

fn parse_rules(object: &Map<String, Value>) -> Vec<(String, Rule)> {
    object
        .iter()
        .filter(|(selector, _)| !is_reserved(selector))
        .filter_map(|(selector, rule)| {
            let rule = rule.as_object()?;
            Some((selector.clone(), Rule::from_object(rule)))
        })
        .collect()
}

impl Rule {
    fn from_object(object: &Map<String, Value>) -> Self {
        let show_default = !matches!(object.get("default"), Some(Value::Bool(false)))
            && !matches!(object.get("showDefault"), Some(Value::Bool(false)));

        Rule {
            html: non_empty_str(object.get("html")),
            attrs: object
                .get("attrs")
                .and_then(Value::as_object)
                .map(parse_attrs)
                .unwrap_or_default(),
            repeat: non_empty_str(object.get("repeat")),
            inside: object.get("inside").and_then(Value::as_object).map(|inside| Mapping {
                rules: parse_rules(inside),
                base_prop: None,
            }),
            show_default,
        }
    }
}

fn parse_attrs(object: &Map<String, Value>) -> Vec<(String, AttrBinding)> {
    object
        .iter()
        .filter_map(|(name, binding)| {
            let binding = match binding {
                Value::String(path) => AttrBinding::Path(path.clone()),
                Value::Object(map) if name == "style" => AttrBinding::Style(string_pairs(map)),
                Value::Object(map) if name == "class" => AttrBinding::Class(
                    string_pairs(map)
                        .into_iter()
                        .map(|(token, path)| (ClassToken::parse(&token), path))
                        .collect(),
                ),
                _ => return None,
            };
            Some((name.clone(), binding))
        })
        .collect()
}

fn string_pairs(map: &Map<String, Value>) -> Vec<(String, String)> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
        .collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
