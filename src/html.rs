//! HTML tree adapter over `dom_query`.
//!
//! Sources starting with `<!doctype` or `<html` are parsed as full
//! documents; anything else is parsed as a fragment, so serializing gives
//! back the fragment without implied `<html>`/`<body>` wrappers.

use dom_query::{Document, NodeRef, Selection};
use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(\s|\n)*\n").expect("Invalid blank line regex"));

static BETWEEN_TAGS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r">\s+<").expect("Invalid between-tags regex"));

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

pub struct HtmlTree {
    doc: Document,
    is_document: bool,
}

impl HtmlTree {
    pub fn parse(html: &str, normalize_whitespace: bool) -> Self {
        let source = if normalize_whitespace {
            normalize(html)
        } else {
            html.to_string()
        };
        let is_document = is_full_document(&source);
        let doc = if is_document {
            Document::from(source.as_str())
        } else {
            Document::fragment(source)
        };
        Self { doc, is_document }
    }

    /// All elements matching `selector`, in document order.
    /// Invalid selectors match nothing.
    pub fn select(&self, selector: &str) -> Vec<NodeRef<'_>> {
        select_within(&self.doc.root(), selector)
    }

    /// The node whose children make up the serialized output.
    fn container(&self) -> NodeRef<'_> {
        let root = self.doc.root();
        if self.is_document {
            return root;
        }
        let elements = root.element_children();
        match elements.as_slice() {
            [only] if is_named(only, "html") => only.clone(),
            _ => root,
        }
    }

    /// Top-level elements (the `<html>` element for full documents).
    pub fn root_elements(&self) -> Vec<NodeRef<'_>> {
        self.container().element_children()
    }

    pub fn serialize(&self) -> String {
        if self.is_document {
            self.doc.html().to_string()
        } else {
            self.container().inner_html().to_string()
        }
    }
}

/// Descendants of `node` matching `selector`, in document order.
pub fn select_within<'a>(node: &NodeRef<'a>, selector: &str) -> Vec<NodeRef<'a>> {
    Selection::from(node.clone())
        .try_select(selector)
        .map(|found| found.nodes().to_vec())
        .unwrap_or_default()
}

pub fn is_full_document(html: &str) -> bool {
    let head = html.trim_start();
    let head = head.get(..9).unwrap_or(head).to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

pub fn is_named(node: &NodeRef<'_>, name: &str) -> bool {
    node.node_name()
        .map_or(false, |n| n.eq_ignore_ascii_case(name))
}

pub fn attr(node: &NodeRef<'_>, name: &str) -> Option<String> {
    node.attr(name).map(|v| v.to_string())
}

/// First attribute among `names` with a non-empty value.
pub fn first_attr(node: &NodeRef<'_>, names: &[String]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| attr(node, name))
        .find(|value| !value.is_empty())
}

/// Nearest element, starting with `node` itself, carrying `name`.
pub fn closest_attr(node: &NodeRef<'_>, name: &str) -> Option<String> {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if n.is_element() {
            if let Some(value) = attr(&n, name) {
                return Some(value);
            }
        }
        current = n.parent();
    }
    None
}

/// Nearest preceding sibling that is an element.
pub fn prev_element<'a>(node: &NodeRef<'a>) -> Option<NodeRef<'a>> {
    let mut current = node.prev_sibling();
    while let Some(n) = current {
        if n.is_element() {
            return Some(n);
        }
        current = n.prev_sibling();
    }
    None
}

/// Whitespace-separated class tokens.
pub fn class_list(node: &NodeRef<'_>) -> Vec<String> {
    attr(node, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Inline style
// ---------------------------------------------------------------------------

/// Parse a `style` attribute into ordered `(property, value)` pairs.
pub fn style_entries(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            Some((prop.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn style_text(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(prop, value)| format!("{}: {};", prop, value))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn style_value(node: &NodeRef<'_>, property: &str) -> Option<String> {
    let style = attr(node, "style")?;
    style_entries(&style)
        .into_iter()
        .find(|(prop, _)| prop == property)
        .map(|(_, value)| value)
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single newline.
pub fn collapse_blank_lines(html: &str) -> String {
    BLANK_LINES_RE.replace_all(html, "\n").into_owned()
}

/// Drop whitespace between tags and collapse remaining runs to one space.
pub fn normalize(html: &str) -> String {
    let html = BETWEEN_TAGS_RE.replace_all(html, "><");
    WHITESPACE_RE.replace_all(&html, " ").into_owned()
}
