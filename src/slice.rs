//! Fragment slicer.
//!
//! Splits rendered composite markup into the id-tagged pieces it was built
//! from. Each tagged element becomes one fragment with its nested tagged
//! descendants cut out; consecutive siblings with the same template and
//! widget id are merged back into a single fragment.

use dom_query::NodeRef;

use crate::html::{self, HtmlTree};
use crate::{Fragment, ViewConfig};

pub fn slice(html: &str, id_attribute: Option<&str>, config: &ViewConfig) -> Vec<Fragment> {
    let id_attribute = id_attribute
        .filter(|a| !a.is_empty())
        .unwrap_or(&config.template_id_attribute);
    let widget_attribute = config.widget_id_attribute.as_str();
    let selector = format!("[{}]", id_attribute);

    let tree = HtmlTree::parse(html, false);
    let mut fragments: Vec<Fragment> = Vec::new();

    for element in tree.select(&selector) {
        let Some(template) = html::attr(&element, id_attribute).filter(|t| !t.is_empty()) else {
            continue;
        };
        let widget_id = html::attr(&element, widget_attribute).unwrap_or_default();
        let markup = detached_html(&element, &selector);

        let continues_previous = html::prev_element(&element).is_some_and(|prev| {
            html::attr(&prev, id_attribute).as_deref() == Some(template.as_str())
                && html::attr(&prev, widget_attribute).unwrap_or_default() == widget_id
        });
        if continues_previous {
            let previous = fragments
                .iter_mut()
                .rev()
                .find(|f| f.template == template && f.widget_id == widget_id);
            if let Some(previous) = previous {
                previous.html.push_str(&markup);
                continue;
            }
        }

        fragments.push(Fragment {
            container_id: html::closest_attr(&element, config.container_attribute())
                .unwrap_or_default(),
            template,
            html: markup,
            widget_id,
        });
    }

    tracing::debug!(fragments = fragments.len(), "sliced markup");
    fragments
}

/// Outer markup of `element` without its tagged descendants.
fn detached_html(element: &NodeRef<'_>, selector: &str) -> String {
    let copy = HtmlTree::parse(&element.html(), false);
    for root in copy.root_elements() {
        for nested in html::select_within(&root, selector) {
            nested.remove_from_parent();
        }
    }
    copy.serialize()
}
