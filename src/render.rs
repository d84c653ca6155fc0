//! Compiled views and the program interpreter.

use std::sync::Arc;

use serde_json::Value;

use crate::codegen::{Node, Op, Program};
use crate::keypath::DynamicKeys;
use crate::mapping::Mapping;
use crate::runtime::{self, encode, to_text};
use crate::{ContainerRef, Containers, PartialRef, ViewConfig};

/// Everything the compiler learned about a view besides its program.
#[derive(Debug, Clone, Default)]
pub struct ViewMeta {
    pub is_layout: bool,
    pub layout: Option<String>,
    pub partials: Vec<PartialRef>,
    pub containers: Vec<ContainerRef>,
    pub mapping: Mapping,
    pub template_id: Option<String>,
}

/// Arguments of a single render call.
///
/// Omitted partials and containers render empty; an omitted widget id
/// renders as an empty attribute in show-ids mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderArgs<'a> {
    pub mode: &'a str,
    pub body: &'a str,
    pub partials: &'a [String],
    pub containers: Option<&'a Containers>,
    pub widget_id: &'a str,
    pub dynamic_keys: Option<&'a DynamicKeys>,
}

/// A compiled view: immutable, so one instance can render concurrently.
#[derive(Debug, Clone)]
pub struct CompiledView {
    program: Program,
    config: Arc<ViewConfig>,
    meta: ViewMeta,
}

impl CompiledView {
    pub fn new(program: Program, config: Arc<ViewConfig>, meta: ViewMeta) -> Self {
        Self {
            program,
            config,
            meta,
        }
    }

    /// True when the view has a body placeholder.
    pub fn is_layout(&self) -> bool {
        self.meta.is_layout
    }

    /// Name of the layout this view renders inside.
    pub fn layout(&self) -> Option<&str> {
        self.meta.layout.as_deref()
    }

    pub fn partials(&self) -> &[PartialRef] {
        &self.meta.partials
    }

    pub fn containers(&self) -> &[ContainerRef] {
        &self.meta.containers
    }

    pub fn mapping(&self) -> &Mapping {
        &self.meta.mapping
    }

    pub fn template_id(&self) -> Option<&str> {
        self.meta.template_id.as_deref()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn render(&self, model: &Value, args: &RenderArgs<'_>) -> String {
        let no_keys = DynamicKeys::new();
        let no_containers = Containers::new();
        let renderer = Renderer {
            config: &self.config,
            args,
            dynamic_keys: args.dynamic_keys.unwrap_or(&no_keys),
            containers: args.containers.unwrap_or(&no_containers),
        };
        let mut out = String::new();
        renderer.nodes(&self.program.nodes, model, &mut out);
        out
    }
}

struct Renderer<'r> {
    config: &'r ViewConfig,
    args: &'r RenderArgs<'r>,
    dynamic_keys: &'r DynamicKeys,
    containers: &'r Containers,
}

impl Renderer<'_> {
    fn nodes(&self, nodes: &[Node], model: &Value, out: &mut String) {
        for node in nodes {
            match node {
                Node::Literal(text) => out.push_str(text),
                Node::Expr { op, body } => self.expr(op, body, model, out),
            }
        }
    }

    fn expr(&self, op: &Op, body: &[Node], model: &Value, out: &mut String) {
        match op {
            Op::Value {
                path,
                encode,
                default,
            } => {
                match runtime::try_resolve(model, path, *encode, self.dynamic_keys) {
                    Some(value) => out.push_str(&to_text(&value)),
                    None => self.nodes(default, model, out),
                }
            }
            Op::Class { base, bindings } => {
                let classes = bindings.iter().fold(base.clone(), |classes, (token, path)| {
                    runtime::apply_class(model, token, path, classes, self.dynamic_keys)
                });
                out.push_str(&encode(&classes.join(" ")));
            }
            Op::Repeat { path, fallback } => {
                let items = runtime::resolve(model, path, false, &Value::Null, self.dynamic_keys);
                match items {
                    Value::Array(items) if !items.is_empty() => {
                        for item in &items {
                            self.nodes(body, item, out);
                        }
                    }
                    _ => {
                        if let Some(fallback) = fallback {
                            self.nodes(fallback, model, out);
                        }
                    }
                }
            }
            Op::Partial { index } => {
                if let Some(partial) = self.args.partials.get(*index) {
                    out.push_str(partial);
                }
            }
            Op::Container { id } => {
                if let Some(content) = self.containers.get(id) {
                    out.push_str(content);
                }
            }
            Op::ContainerIds { id, widgets } => {
                if self.show_ids() {
                    out.push_str(&format!(
                        r#" {}="{}" {}="{}""#,
                        self.config.container_attribute(),
                        encode(id),
                        self.config.container_widgets_attribute(),
                        encode(&widgets.join(","))
                    ));
                }
            }
            Op::Body => out.push_str(self.args.body),
            Op::DebugIds { template_id } => {
                if self.show_ids() {
                    out.push_str(&format!(
                        r#" {}="{}" {}="{}""#,
                        self.config.template_id_attribute,
                        encode(template_id),
                        self.config.widget_id_attribute,
                        encode(self.args.widget_id)
                    ));
                }
            }
            Op::ModeGate { mode } => {
                if self.args.mode == mode.as_str() {
                    self.nodes(body, model, out);
                }
            }
        }
    }

    fn show_ids(&self) -> bool {
        self.args.mode == self.config.show_ids_mode
    }
}
