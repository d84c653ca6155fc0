//! # mapview
//!
//! Bidirectional HTML templating. A [`Mapping`] ties CSS selectors to paths
//! in a JSON model; the same mapping drives both directions:
//!
//! - **compile**: rewrite an HTML document into a render program
//!   ([`CompiledView`]) that produces markup from a model.
//! - **extract**: read a model back out of rendered (or hand-edited) markup.
//!
//! A third operation, [`slice`], splits a rendered composite page back into
//! the id-tagged fragments it was assembled from.
//!
//! The render program is a pure function of its arguments. Compilation never
//! evaluates source text: markers in the rewritten markup reference a
//! directive table and are lexed into an explicit IR (see [`codegen`]).

pub mod codegen;
pub mod compile;
pub mod extract;
pub mod html;
pub mod keypath;
pub mod mapping;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod slice;
pub mod xml;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use keypath::DynamicKeys;
pub use mapping::{AttrBinding, ClassToken, Mapping, Rule};
pub use registry::{ChangeKind, FileChange, RegistryOptions, ViewRegistry};
pub use render::{CompiledView, RenderArgs};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sentinels and reserved markup vocabulary shared by every stage.
///
/// Immutable once built; pass a different value to run several
/// configurations side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewConfig {
    /// Opens a marker. Must not contain `&`, `<`, `>` or `"`.
    pub code_start: String,
    /// Closes a marker.
    pub code_end: String,
    /// Wrapper element for markers that replace whole elements.
    pub render_code_tag: String,
    /// Placeholder attribute carrying debug-attribute markers.
    pub render_attribute: String,
    pub template_id_attribute: String,
    pub widget_id_attribute: String,
    /// Container id attributes; the first one is echoed in show-ids mode.
    pub container_attributes: Vec<String>,
    /// Allowed-widget list attributes; the first one is echoed in show-ids mode.
    pub container_widgets_attributes: Vec<String>,
    pub show_if_mode_attribute: String,
    /// Render mode in which template, widget and container ids are emitted.
    pub show_ids_mode: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            code_start: "\u{2}\u{E000}".into(),
            code_end: "\u{E001}\u{3}".into(),
            render_code_tag: "e-render-code".into(),
            render_attribute: "e-render-attribute".into(),
            template_id_attribute: "e-template-id".into(),
            widget_id_attribute: "e-widget-id".into(),
            container_attributes: vec!["e-container".into(), "e-container-id".into()],
            container_widgets_attributes: vec![
                "e-container-widgets".into(),
                "e-container-templates".into(),
            ],
            show_if_mode_attribute: "show-if-mode".into(),
            show_ids_mode: "admin".into(),
        }
    }
}

impl ViewConfig {
    /// Attribute name used when echoing a container id.
    pub fn container_attribute(&self) -> &str {
        self.container_attributes
            .first()
            .map(String::as_str)
            .unwrap_or("e-container")
    }

    /// Attribute name used when echoing a container's allowed widgets.
    pub fn container_widgets_attribute(&self) -> &str {
        self.container_widgets_attributes
            .first()
            .map(String::as_str)
            .unwrap_or("e-container-widgets")
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Collapse whitespace runs before parsing.
    pub normalize_whitespace: bool,
    /// Emitted as the template-id debug attribute in show-ids mode.
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractOptions {
    pub dynamic_keys: DynamicKeys,
    pub normalize_whitespace: bool,
    /// Object the extracted values are written into. Defaults to `{}`.
    pub seed: Option<Value>,
}

// ---------------------------------------------------------------------------
// Compiled view metadata
// ---------------------------------------------------------------------------

/// A `<partial>` / `<widget>` placeholder, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRef {
    pub template: String,
    pub id: String,
}

/// An element accepting pre-rendered widget content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
    /// Allowed widget templates. Empty when the attribute is missing.
    pub widgets: Vec<String>,
}

/// One id-tagged piece of a rendered composite page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub template: String,
    pub html: String,
    pub container_id: String,
    pub widget_id: String,
}

// ---------------------------------------------------------------------------
// ViewError
// ---------------------------------------------------------------------------

/// Errors that abort compilation, code generation or a registry operation.
///
/// Missing model data is never an error; it degrades to defaults.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Only one <render-body> element is allowed (template: {})", display_template(.template))]
    MultipleBodies { template: Option<String> },

    #[error("Only one <layout> element is allowed and it has to be the root element (template: {})", display_template(.template))]
    MultipleLayouts { template: Option<String> },

    #[error("Unterminated marker opened at byte {offset} (template: {})", display_template(.template))]
    UnterminatedMarker {
        template: Option<String>,
        offset: usize,
    },

    #[error("Marker closed at byte {offset} was never opened (template: {})", display_template(.template))]
    UnbalancedMarker {
        template: Option<String>,
        offset: usize,
    },

    #[error("Malformed marker at byte {offset}: {reason} (template: {})", display_template(.template))]
    MalformedMarker {
        template: Option<String>,
        offset: usize,
        reason: String,
    },

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("View \"{0}\" not found")]
    ViewNotFound(String),

    #[error("View \"{id}\" compilation failed")]
    ViewFailed {
        id: String,
        #[source]
        source: Arc<ViewError>,
    },

    #[error("Template \"{template}\" failed")]
    Template {
        template: String,
        #[source]
        source: Box<ViewError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Task failed: {0}")]
    Task(String),
}

fn display_template(template: &Option<String>) -> &str {
    template.as_deref().unwrap_or("<anonymous>")
}

impl ViewError {
    /// Wrap an error with the template it came from.
    pub fn in_template(self, template: impl Into<String>) -> Self {
        ViewError::Template {
            template: template.into(),
            source: Box::new(self),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Entry point bundling a [`ViewConfig`] with the four core operations.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: Arc<ViewConfig>,
}

impl Engine {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Compile `html` against `mapping` into a render program.
    pub fn compile(
        &self,
        html: &str,
        mapping: &Mapping,
        options: &CompileOptions,
    ) -> Result<CompiledView, ViewError> {
        let rewritten = compile::rewrite(html, mapping, options, &self.config)?;
        let program = codegen::generate(
            &rewritten.markup,
            rewritten.directives,
            &self.config,
            options.template_id.as_deref(),
        )?;

        tracing::debug!(
            template = options.template_id.as_deref().unwrap_or(""),
            partials = rewritten.partials.len(),
            containers = rewritten.containers.len(),
            is_layout = rewritten.is_layout,
            "compiled view"
        );

        Ok(CompiledView::new(
            program,
            Arc::clone(&self.config),
            render::ViewMeta {
                is_layout: rewritten.is_layout,
                layout: rewritten.layout,
                partials: rewritten.partials,
                containers: rewritten.containers,
                mapping: mapping.clone(),
                template_id: options.template_id.clone(),
            },
        ))
    }

    /// Read a model out of `html` using `mapping`.
    pub fn extract(
        &self,
        html: &str,
        mapping: &Mapping,
        options: &ExtractOptions,
    ) -> Result<Value, ViewError> {
        extract::extract(html, mapping, options)
    }

    /// [`Engine::extract`] on the blocking pool, so large documents do not
    /// stall the async executor.
    pub async fn extract_async(
        &self,
        html: String,
        mapping: Mapping,
        options: ExtractOptions,
    ) -> Result<Value, ViewError> {
        extract::extract_async(html, mapping, options).await
    }

    /// Split rendered composite markup into id-tagged fragments.
    /// `id_attribute` defaults to the configured template-id attribute.
    pub fn slice(&self, html: &str, id_attribute: Option<&str>) -> Vec<Fragment> {
        slice::slice(html, id_attribute, &self.config)
    }
}

// ---------------------------------------------------------------------------
// Public API (default configuration)
// ---------------------------------------------------------------------------

/// Compile with the default [`ViewConfig`].
pub fn compile(
    html: &str,
    mapping: &Mapping,
    options: &CompileOptions,
) -> Result<CompiledView, ViewError> {
    Engine::default().compile(html, mapping, options)
}

/// Extract with the default [`ViewConfig`].
pub fn extract(
    html: &str,
    mapping: &Mapping,
    options: &ExtractOptions,
) -> Result<Value, ViewError> {
    Engine::default().extract(html, mapping, options)
}

/// Async extraction with the default [`ViewConfig`].
pub async fn extract_async(
    html: String,
    mapping: Mapping,
    options: ExtractOptions,
) -> Result<Value, ViewError> {
    Engine::default()
        .extract_async(html, mapping, options)
        .await
}

/// Slice with the default [`ViewConfig`].
pub fn slice(html: &str, id_attribute: Option<&str>) -> Vec<Fragment> {
    Engine::default().slice(html, id_attribute)
}

/// Pre-rendered container contents keyed by container id.
pub type Containers = HashMap<String, String>;
