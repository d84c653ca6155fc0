//! Marker lexer.
//!
//! Turns the compiler's marked-up markup into a [`Program`]: a tree of
//! literal segments and directive expressions, interpreted by
//! [`crate::render`]. Markers nest, so the lexer keeps an explicit stack of
//! open frames; closing a marker folds its frame into the parent.
//!
//! Unbalanced input is rejected: a close sentinel with no open marker gives
//! [`ViewError::UnbalancedMarker`], input ending with open markers gives
//! [`ViewError::UnterminatedMarker`].

use regex::Regex;

use crate::compile::Directive;
use crate::html;
use crate::mapping::ClassToken;
use crate::{ViewConfig, ViewError};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(String),
    Expr { op: Op, body: Vec<Node> },
}

/// Executable form of a [`Directive`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `default` renders when the path is missing; it may hold markers of
    /// rewritten descendants.
    Value {
        path: String,
        encode: bool,
        default: Vec<Node>,
    },
    Class {
        base: Vec<String>,
        bindings: Vec<(ClassToken, String)>,
    },
    Repeat {
        path: String,
        fallback: Option<Vec<Node>>,
    },
    Partial {
        index: usize,
    },
    Container {
        id: String,
    },
    ContainerIds {
        id: String,
        widgets: Vec<String>,
    },
    Body,
    DebugIds {
        template_id: String,
    },
    ModeGate {
        mode: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub nodes: Vec<Node>,
}

struct Frame {
    op: Op,
    offset: usize,
    nodes: Vec<Node>,
}

struct Lexer<'a> {
    config: &'a ViewConfig,
    directives: &'a [Directive],
    template: Option<&'a str>,
    code_tag_re: Regex,
    render_attribute_re: Regex,
}

impl<'a> Lexer<'a> {
    fn new(config: &'a ViewConfig, directives: &'a [Directive], template: Option<&'a str>) -> Self {
        let tag = regex::escape(&config.render_code_tag);
        let attribute = regex::escape(&config.render_attribute);
        Self {
            config,
            directives,
            template,
            code_tag_re: Regex::new(&format!(r"<{tag}[^>]*>|</{tag}>"))
                .expect("Invalid render-code tag regex"),
            render_attribute_re: Regex::new(&format!(r#" {attribute}="([^"]*)""#))
                .expect("Invalid render attribute regex"),
        }
    }

    /// Drop the render-code wrappers and unwrap the render attribute so its
    /// markers sit directly inside the start tag.
    fn prescan(&self, markup: &str) -> String {
        let markup = html::collapse_blank_lines(markup).replace("\r\n", "\n");
        let markup = self.code_tag_re.replace_all(&markup, "");
        self.render_attribute_re
            .replace_all(&markup, "$1")
            .into_owned()
    }

    fn lex(&self, markup: &str) -> Result<Vec<Node>, ViewError> {
        let start = self.config.code_start.as_str();
        let end = self.config.code_end.as_str();

        let mut root = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut pos = 0;

        while pos < markup.len() {
            let rest = &markup[pos..];
            let next = [rest.find(start), rest.find(end)]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());

            if next > 0 {
                push_literal(current(&mut root, &mut stack), &rest[..next]);
                pos += next;
                continue;
            }

            if rest.starts_with(start) {
                let header = &rest[start.len()..];
                let colon = header
                    .find(':')
                    .ok_or_else(|| self.malformed(pos, "missing ':' after directive index".into()))?;
                let digits = &header[..colon];
                let index: usize = digits
                    .parse()
                    .map_err(|_| self.malformed(pos, format!("invalid directive index {:?}", digits)))?;
                let directive = self
                    .directives
                    .get(index)
                    .ok_or_else(|| self.malformed(pos, format!("directive index {} out of range", index)))?;

                stack.push(Frame {
                    op: self.op(directive)?,
                    offset: pos,
                    nodes: Vec::new(),
                });
                pos += start.len() + colon + 1;
            } else {
                let Some(frame) = stack.pop() else {
                    return Err(ViewError::UnbalancedMarker {
                        template: self.template.map(str::to_string),
                        offset: pos,
                    });
                };
                current(&mut root, &mut stack).push(Node::Expr {
                    op: frame.op,
                    body: frame.nodes,
                });
                pos += end.len();
            }
        }

        if let Some(frame) = stack.first() {
            return Err(ViewError::UnterminatedMarker {
                template: self.template.map(str::to_string),
                offset: frame.offset,
            });
        }
        Ok(root)
    }

    fn op(&self, directive: &Directive) -> Result<Op, ViewError> {
        Ok(match directive {
            Directive::Value {
                path,
                encode,
                default,
            } => Op::Value {
                path: path.clone(),
                encode: *encode,
                default: self.lex(&self.prescan(default))?,
            },
            Directive::Class { base, bindings } => Op::Class {
                base: base.clone(),
                bindings: bindings.clone(),
            },
            Directive::Repeat { path, fallback } => Op::Repeat {
                path: path.clone(),
                fallback: fallback
                    .as_deref()
                    .map(|markup| self.lex(&self.prescan(markup)))
                    .transpose()?,
            },
            Directive::Partial { index } => Op::Partial { index: *index },
            Directive::Container { id } => Op::Container { id: id.clone() },
            Directive::ContainerIds { id, widgets } => Op::ContainerIds {
                id: id.clone(),
                widgets: widgets.clone(),
            },
            Directive::Body => Op::Body,
            Directive::DebugIds { template_id } => Op::DebugIds {
                template_id: template_id.clone(),
            },
            Directive::ModeGate { mode } => Op::ModeGate { mode: mode.clone() },
        })
    }

    fn malformed(&self, offset: usize, reason: String) -> ViewError {
        ViewError::MalformedMarker {
            template: self.template.map(str::to_string),
            offset,
            reason,
        }
    }
}

fn current<'s>(root: &'s mut Vec<Node>, stack: &'s mut [Frame]) -> &'s mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.nodes,
        None => root,
    }
}

fn push_literal(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Literal(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Literal(text.to_string()));
    }
}

/// Lex compiled markup into a program over `directives`.
pub fn generate(
    markup: &str,
    directives: Vec<Directive>,
    config: &ViewConfig,
    template: Option<&str>,
) -> Result<Program, ViewError> {
    let lexer = Lexer::new(config, &directives, template);
    let nodes = lexer.lex(&lexer.prescan(markup))?;
    tracing::trace!(
        template = template.unwrap_or(""),
        directives = directives.len(),
        nodes = nodes.len(),
        "generated program"
    );
    Ok(Program { nodes })
}
