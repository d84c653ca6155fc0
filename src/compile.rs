//! Mapping compiler.
//!
//! Walks a [`Mapping`] against the parsed tree and rewrites matched elements
//! into markup carrying *markers*. A marker is
//!
//! ```text
//! code_start <directive index> ':' [body markup] code_end
//! ```
//!
//! where the index points into the directive table returned alongside the
//! markup. Markers that stand for whole elements are wrapped in the
//! configured render-code element; markers emitting attributes live in the
//! render attribute. Both wrappers are stripped again by [`crate::codegen`].
//! Repeats and mode gates keep their element in the tree and get bare
//! marker text on either side, so table rows and options stay in their
//! parsing context.
//!
//! Binding a style property rewrites the whole `style` attribute as
//! `prop: value;` pairs, unbound declarations included.
//!
//! After the selector walk, structural passes run in this order: partial and
//! widget placeholders, containers, the body placeholder, layout unwrapping,
//! debug ids on top-level elements, mode-gated blocks.

use dom_query::{NodeId, NodeRef};

use crate::html::{self, HtmlTree};
use crate::mapping::{AttrBinding, ClassToken, Mapping, Rule};
use crate::runtime::encode;
use crate::{CompileOptions, ContainerRef, PartialRef, ViewConfig, ViewError};

/// A unit of generated behaviour referenced from a marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Resolved value, or `default` when the path is missing.
    Value {
        path: String,
        encode: bool,
        default: String,
    },
    /// Class list computed from the element's original classes.
    Class {
        base: Vec<String>,
        bindings: Vec<(ClassToken, String)>,
    },
    /// Marker body repeated per array item; `fallback` is the original
    /// markup emitted for an empty source.
    Repeat {
        path: String,
        fallback: Option<String>,
    },
    /// Pre-rendered partial by position.
    Partial { index: usize },
    /// Pre-rendered container content by id.
    Container { id: String },
    /// Container id attributes, shown only in show-ids mode.
    ContainerIds { id: String, widgets: Vec<String> },
    /// The body argument of a layout.
    Body,
    /// Template and widget id attributes, shown only in show-ids mode.
    DebugIds { template_id: String },
    /// Marker body emitted only in the given render mode.
    ModeGate { mode: String },
}

/// Compiler output, input to code generation.
#[derive(Debug, Clone)]
pub struct RewrittenMarkup {
    pub markup: String,
    pub directives: Vec<Directive>,
    pub is_layout: bool,
    pub layout: Option<String>,
    pub partials: Vec<PartialRef>,
    pub containers: Vec<ContainerRef>,
}

struct Rewriter<'c> {
    config: &'c ViewConfig,
    directives: Vec<Directive>,
    /// Elements enclosed by bare marker text; they get no debug ids.
    enclosed: Vec<NodeId>,
}

impl<'c> Rewriter<'c> {
    fn push(&mut self, directive: Directive) -> usize {
        self.directives.push(directive);
        self.directives.len() - 1
    }

    /// A marker without body.
    fn marker(&mut self, directive: Directive) -> String {
        let index = self.push(directive);
        format!("{}{}:{}", self.config.code_start, index, self.config.code_end)
    }

    /// A marker wrapping `body`, inside the render-code element.
    fn block(&mut self, directive: Directive, body: &str) -> String {
        let index = self.push(directive);
        format!(
            "<{tag}>{}{}:{}{}</{tag}>",
            self.config.code_start,
            index,
            body,
            self.config.code_end,
            tag = self.config.render_code_tag
        )
    }

    /// Open a marker right before `element` and close it right after, leaving
    /// the element itself in place.
    fn enclose(&mut self, directive: Directive, element: &NodeRef<'_>) {
        let index = self.push(directive);
        let open = element
            .tree
            .new_text(format!("{}{}:", self.config.code_start, index));
        let close = element.tree.new_text(self.config.code_end.as_str());
        element.insert_before(&open);
        element.insert_after(&close);
        self.enclosed.push(element.id);
    }

    // -----------------------------------------------------------------------
    // Selector walk
    // -----------------------------------------------------------------------

    fn apply_mapping<'a>(&mut self, matches: impl Fn(&str) -> Vec<NodeRef<'a>>, mapping: &Mapping) {
        for (selector, rule) in &mapping.rules {
            let elements = matches(selector);
            let Some(first) = elements.first() else {
                continue;
            };
            tracing::trace!(selector = selector.as_str(), matched = elements.len(), "rewriting");

            if let Some(repeat) = &rule.repeat {
                self.apply_repeat(repeat, rule, &elements);
            } else {
                if let Some(path) = &rule.html {
                    self.apply_html(path, first);
                }
                self.apply_attrs(rule, first);
            }
        }
    }

    fn apply_html(&mut self, path: &str, element: &NodeRef<'_>) {
        let marker = self.marker(Directive::Value {
            path: path.to_string(),
            encode: true,
            default: element.inner_html().to_string(),
        });
        element.set_html(marker);
    }

    fn apply_attrs(&mut self, rule: &Rule, element: &NodeRef<'_>) {
        for (name, binding) in &rule.attrs {
            match binding {
                AttrBinding::Path(path) => {
                    let marker = self.marker(Directive::Value {
                        path: path.clone(),
                        encode: true,
                        default: encode(&html::attr(element, name).unwrap_or_default()),
                    });
                    element.set_attr(name, &marker);
                }
                AttrBinding::Style(properties) => {
                    let mut entries = html::attr(element, "style")
                        .map(|s| html::style_entries(&s))
                        .unwrap_or_default();
                    for (property, path) in properties {
                        let current = entries.iter().position(|(p, _)| p == property);
                        let marker = self.marker(Directive::Value {
                            path: path.clone(),
                            encode: true,
                            default: current
                                .map(|i| encode(&entries[i].1))
                                .unwrap_or_default(),
                        });
                        match current {
                            Some(i) => entries[i].1 = marker,
                            None => entries.push((property.clone(), marker)),
                        }
                    }
                    element.set_attr("style", &html::style_text(&entries));
                }
                AttrBinding::Class(bindings) => {
                    let marker = self.marker(Directive::Class {
                        base: html::class_list(element),
                        bindings: bindings.clone(),
                    });
                    element.set_attr("class", &marker);
                }
            }
        }
    }

    /// The first match becomes the template; later sibling matches only
    /// contribute to the fallback markup and are removed.
    fn apply_repeat(&mut self, path: &str, rule: &Rule, elements: &[NodeRef<'_>]) {
        let template = &elements[0];
        let parent = template.parent();
        let mut default_content = template.html().to_string();

        for sibling in &elements[1..] {
            let same_parent = match (&parent, sibling.parent()) {
                (Some(a), Some(b)) => a.id == b.id,
                _ => false,
            };
            if same_parent {
                default_content.push_str(&sibling.html());
                sibling.remove_from_parent();
            }
        }
        let default_content = html::collapse_blank_lines(&default_content);

        if let Some(html_path) = &rule.html {
            self.apply_html(html_path, template);
        }
        self.apply_attrs(rule, template);
        if let Some(inside) = &rule.inside {
            self.apply_mapping(|selector| html::select_within(template, selector), inside);
        }

        self.enclose(
            Directive::Repeat {
                path: path.to_string(),
                fallback: rule.show_default.then_some(default_content),
            },
            template,
        );
    }

    // -----------------------------------------------------------------------
    // Structural passes
    // -----------------------------------------------------------------------

    fn partials(&mut self, tree: &HtmlTree) -> Vec<PartialRef> {
        let mut partials = Vec::new();
        for node in tree.select("partial,widget") {
            let Some(template) = html::attr(&node, "template").filter(|t| !t.is_empty()) else {
                continue;
            };
            partials.push(PartialRef {
                template,
                id: html::attr(&node, "id").unwrap_or_default(),
            });
            let block = self.block(
                Directive::Partial {
                    index: partials.len() - 1,
                },
                "",
            );
            node.replace_with_html(block);
        }
        partials
    }

    fn containers(&mut self, tree: &HtmlTree) -> Vec<ContainerRef> {
        let config = self.config;
        let selector = config
            .container_attributes
            .iter()
            .map(|a| format!("[{}]", a))
            .collect::<Vec<_>>()
            .join(",");

        let mut containers = Vec::new();
        for node in tree.select(&selector) {
            let Some(id) = html::first_attr(&node, &config.container_attributes) else {
                continue;
            };
            let widgets: Vec<String> = html::first_attr(&node, &config.container_widgets_attributes)
                .unwrap_or_default()
                .split(',')
                .map(|w| w.chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .filter(|w| !w.is_empty())
                .collect();

            let content = self.block(Directive::Container { id: id.clone() }, "");
            node.set_html(content);
            for name in config
                .container_attributes
                .iter()
                .chain(&config.container_widgets_attributes)
            {
                node.remove_attr(name);
            }
            let ids = self.marker(Directive::ContainerIds {
                id: id.clone(),
                widgets: widgets.clone(),
            });
            node.set_attr(&config.render_attribute, &ids);

            containers.push(ContainerRef { id, widgets });
        }
        containers
    }

    fn body(&mut self, tree: &HtmlTree, template: Option<&str>) -> Result<bool, ViewError> {
        let bodies = tree.select("renderbody,render-body");
        match bodies.as_slice() {
            [] => Ok(false),
            [body] => {
                let block = self.block(Directive::Body, "");
                body.replace_with_html(block);
                Ok(true)
            }
            _ => Err(ViewError::MultipleBodies {
                template: template.map(str::to_string),
            }),
        }
    }

    fn layout(&mut self, tree: &HtmlTree, template: Option<&str>) -> Result<Option<String>, ViewError> {
        let layouts = tree.select("layout");
        match layouts.as_slice() {
            [] => Ok(None),
            [layout] => {
                let name = html::attr(layout, "template").filter(|t| !t.is_empty());
                if let Some(first) = layout.first_child() {
                    layout.insert_siblings_before(&first);
                }
                layout.remove_from_parent();
                Ok(name)
            }
            _ => Err(ViewError::MultipleLayouts {
                template: template.map(str::to_string),
            }),
        }
    }

    fn debug_ids(&mut self, tree: &HtmlTree, template: Option<&str>) {
        let attribute = self.config.render_attribute.clone();
        for element in tree.root_elements() {
            if self.enclosed.contains(&element.id) {
                continue;
            }
            let marker = self.marker(Directive::DebugIds {
                template_id: template.unwrap_or_default().to_string(),
            });
            let value = html::attr(&element, &attribute).unwrap_or_default() + &marker;
            element.set_attr(&attribute, &value);
        }
    }

    fn mode_gates(&mut self, tree: &HtmlTree) {
        let attribute = self.config.show_if_mode_attribute.clone();
        for element in tree.select(&format!("[{}]", attribute)) {
            let mode = html::attr(&element, &attribute).unwrap_or_default();
            element.remove_attr(&attribute);
            self.enclose(Directive::ModeGate { mode }, &element);
        }
    }
}

/// Rewrite `html` per `mapping` into marked-up markup plus directive table.
pub fn rewrite(
    html: &str,
    mapping: &Mapping,
    options: &CompileOptions,
    config: &ViewConfig,
) -> Result<RewrittenMarkup, ViewError> {
    let tree = HtmlTree::parse(html, options.normalize_whitespace);
    let template = options.template_id.as_deref();
    let mut rewriter = Rewriter {
        config,
        directives: Vec::new(),
        enclosed: Vec::new(),
    };

    rewriter.apply_mapping(|selector| tree.select(selector), mapping);

    let partials = rewriter.partials(&tree);
    let containers = rewriter.containers(&tree);
    let is_layout = rewriter.body(&tree, template)?;
    let layout = rewriter.layout(&tree, template)?;
    rewriter.debug_ids(&tree, template);
    rewriter.mode_gates(&tree);

    Ok(RewrittenMarkup {
        markup: tree.serialize(),
        directives: rewriter.directives,
        is_layout,
        layout,
        partials,
        containers,
    })
}
