//! View registry.
//!
//! Compiles a directory of views once, keeps the results in a
//! [`ViewCache`] and renders pages together with their partials and layout.
//!
//! A view is an `.html` file. Its mapping lives next to it as
//! `<view>.html.json` and an optional client script as `<view>.html.js`.
//! View ids are `<view dir id>/<path relative to the view dir>` with `/`
//! separators, e.g. `views/widgets/menu.html`.

pub mod view_cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::{CompiledView, RenderArgs};
use crate::{CompileOptions, Containers, DynamicKeys, Engine, Mapping, ViewConfig, ViewError};

pub use view_cache::{ViewCache, ViewEntry, ViewResult};

pub const VIEW_EXT: &str = ".html";
pub const MAPPING_EXT: &str = ".json";
pub const SCRIPT_EXT: &str = ".js";

// ---------------------------------------------------------------------------
// Options and change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryOptions {
    /// Prefix of every view id. Defaults to the view directory's name.
    pub view_dir_id: Option<String>,
    pub normalize_whitespace: bool,
    pub config: ViewConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// A change to a file inside the view directory, as reported by a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Optional view-name rewrite applied before lookup.
pub type Rename<'a> = Option<&'a dyn Fn(&str) -> String>;

// ---------------------------------------------------------------------------
// ViewRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    engine: Engine,
    options: RegistryOptions,
    cache: ViewCache,
    /// The directory given to [`ViewRegistry::init`].
    root: Option<PathBuf>,
}

impl ViewRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            engine: Engine::new(options.config.clone()),
            options,
            cache: ViewCache::new(),
            root: None,
        }
    }

    /// Compile every view under `dir`, creating the directory if missing.
    ///
    /// Fails on the first view that does not compile.
    pub async fn init(dir: impl AsRef<Path>, mut options: RegistryOptions) -> Result<Self, ViewError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        if options.view_dir_id.is_none() {
            options.view_dir_id = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        }
        let mut registry = Self::new(options);
        registry.root = Some(dir.to_path_buf());

        let files = list_files(dir).await?;
        for path in files.iter().filter(|p| has_suffix(p, VIEW_EXT)) {
            let Some(view_id) = registry.view_id_for(path) else {
                continue;
            };
            let map_path = with_suffix(path, MAPPING_EXT);
            let map_path = files.contains(&map_path).then_some(map_path);

            let view = registry
                .compile_file_async(path, map_path.as_deref(), &view_id)
                .await
                .map_err(|err| err.in_template(view_id.clone()))?;
            registry.cache.store(&view_id, Ok(Arc::new(view)));

            let script_path = with_suffix(path, SCRIPT_EXT);
            if files.contains(&script_path) {
                registry.cache.set_script(&view_id, Some(script_path));
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            views = registry.cache.len(),
            "view registry initialised"
        );
        Ok(registry)
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Compilation
    // -----------------------------------------------------------------------

    /// Read and compile one view with `std::fs`.
    pub fn compile_file(
        &self,
        view_path: &Path,
        map_path: Option<&Path>,
        view_id: &str,
    ) -> Result<CompiledView, ViewError> {
        let mapping = map_path.map(std::fs::read_to_string).transpose()?;
        let html = std::fs::read_to_string(view_path)?;
        self.compile_source(&html, mapping.as_deref(), view_id)
    }

    /// Read and compile one view with `tokio::fs`. A missing mapping file
    /// compiles the view without mapping.
    pub async fn compile_file_async(
        &self,
        view_path: &Path,
        map_path: Option<&Path>,
        view_id: &str,
    ) -> Result<CompiledView, ViewError> {
        let mapping = match map_path {
            Some(path) if tokio::fs::try_exists(path).await? => {
                Some(tokio::fs::read_to_string(path).await?)
            }
            _ => None,
        };
        let html = tokio::fs::read_to_string(view_path).await?;
        self.compile_source(&html, mapping.as_deref(), view_id)
    }

    fn compile_source(
        &self,
        html: &str,
        mapping: Option<&str>,
        view_id: &str,
    ) -> Result<CompiledView, ViewError> {
        let mut mapping = match mapping {
            Some(text) => Mapping::from_json(text)?,
            None => Mapping::default(),
        };
        let template_id = self.strip_view_dir(view_id);
        if mapping.base_prop.is_none() {
            mapping.base_prop = Some(self.template_base_prop(template_id));
        }

        self.engine.compile(
            html,
            &mapping,
            &CompileOptions {
                normalize_whitespace: self.options.normalize_whitespace,
                template_id: Some(template_id.to_string()),
            },
        )
    }

    /// Compile a view living outside the view directory. Failures are
    /// cached and returned rather than raised.
    pub fn register(&self, view_id: &str, view_path: &Path, map_path: Option<&Path>) -> ViewResult {
        let result = wrap(self.compile_file(view_path, map_path, view_id), view_id);
        self.store(view_id, result.clone());
        result
    }

    fn store(&self, view_id: &str, result: ViewResult) {
        if let Err(err) = &result {
            tracing::warn!(view = view_id, error = %err, "view compilation failed");
        }
        self.cache.store(view_id, result);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// A usable view, or why there is none.
    pub fn get(&self, view_id: &str) -> Result<Arc<CompiledView>, ViewError> {
        match self.cache.get(view_id) {
            None => Err(ViewError::ViewNotFound(view_id.to_string())),
            Some(entry) => entry.view.map_err(|source| ViewError::ViewFailed {
                id: view_id.to_string(),
                source,
            }),
        }
    }

    pub fn entry(&self, view_id: &str) -> Option<ViewEntry> {
        self.cache.get(view_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.cache.ids()
    }

    pub fn script(&self, view_id: &str) -> Option<PathBuf> {
        self.cache.get(view_id).and_then(|entry| entry.script)
    }

    /// Whether `view_id` was recompiled or removed since the last check.
    pub fn has_changed(&self, view_id: &str) -> bool {
        self.cache.has_changed(view_id)
    }

    /// Dynamic-key name for a template id: view dir prefix, `widgets/` and
    /// `.html` removed, `/` replaced with `_`.
    pub fn template_base_prop(&self, template_id: &str) -> String {
        let id = self.strip_view_dir(template_id);
        let id = id.strip_prefix("widgets/").unwrap_or(id);
        let id = id.strip_suffix(VIEW_EXT).unwrap_or(id);
        id.replace('/', "_")
    }

    fn strip_view_dir<'a>(&self, id: &'a str) -> &'a str {
        self.options
            .view_dir_id
            .as_deref()
            .and_then(|dir| id.strip_prefix(dir)?.strip_prefix('/'))
            .unwrap_or(id)
    }

    fn view_id_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(self.root.as_ref()?).ok()?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(match &self.options.view_dir_id {
            Some(dir) => format!("{}/{}", dir, relative),
            None => relative,
        })
    }

    // -----------------------------------------------------------------------
    // File changes
    // -----------------------------------------------------------------------

    /// Apply one watcher event. Returns the id of the affected view.
    ///
    /// Compile failures are cached, not returned.
    pub async fn apply_change(&self, change: &FileChange) -> Option<String> {
        let id = self.view_id_for(&change.path)?;

        if has_suffix(&change.path, VIEW_EXT) {
            match change.kind {
                ChangeKind::Removed => {
                    self.cache.remove(&id);
                }
                ChangeKind::Created | ChangeKind::Updated => {
                    let map_path = with_suffix(&change.path, MAPPING_EXT);
                    let result = self
                        .compile_file_async(&change.path, Some(&map_path), &id)
                        .await;
                    self.store(&id, wrap(result, &id));
                }
            }
            return Some(id);
        }

        if let Some(view_id) = id.strip_suffix(MAPPING_EXT).filter(|v| v.ends_with(VIEW_EXT)) {
            let view_path = strip_suffix(&change.path, MAPPING_EXT)?;
            let map_path = match change.kind {
                ChangeKind::Removed if !self.cache.contains(view_id) => return None,
                ChangeKind::Removed => None,
                ChangeKind::Created | ChangeKind::Updated => Some(change.path.as_path()),
            };
            let result = self.compile_file_async(&view_path, map_path, view_id).await;
            self.store(view_id, wrap(result, view_id));
            return Some(view_id.to_string());
        }

        if let Some(view_id) = id.strip_suffix(SCRIPT_EXT).filter(|v| v.ends_with(VIEW_EXT)) {
            let script = match change.kind {
                ChangeKind::Removed => None,
                ChangeKind::Created | ChangeKind::Updated => Some(change.path.clone()),
            };
            self.cache.set_script(view_id, script);
            return Some(view_id.to_string());
        }

        None
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Render `view_name` with its partials, then wrap it in its layout.
    pub fn render(
        &self,
        base_dir_id: Option<&str>,
        view_name: &str,
        model: &Value,
        mode: &str,
        containers: Option<&Containers>,
        rename: Rename<'_>,
    ) -> Result<String, ViewError> {
        let page = Page {
            base_dir_id,
            model,
            mode,
            containers,
            rename,
        };
        page.render(view_name, |id| self.get(id))
    }

    /// [`ViewRegistry::render`], compiling views that are not cached yet
    /// from the directory above the view directory (or the working
    /// directory).
    pub fn render_lazy(
        &self,
        base_dir_id: Option<&str>,
        view_name: &str,
        model: &Value,
        mode: &str,
        containers: Option<&Containers>,
        rename: Rename<'_>,
    ) -> Result<String, ViewError> {
        let page = Page {
            base_dir_id,
            model,
            mode,
            containers,
            rename,
        };
        page.render(view_name, |id| self.get_or_compile(id))
    }

    fn get_or_compile(&self, view_id: &str) -> Result<Arc<CompiledView>, ViewError> {
        if self.cache.contains(view_id) {
            return self.get(view_id);
        }
        let base = match self.root.as_deref().and_then(Path::parent) {
            Some(parent) => parent.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let view_path = base.join(view_id);
        let map_path = with_suffix(&view_path, MAPPING_EXT);
        let map_path = map_path.exists().then_some(map_path);

        let result = self.compile_file(&view_path, map_path.as_deref(), view_id);
        self.store(view_id, wrap(result, view_id));
        self.get(view_id)
    }
}

fn wrap(result: Result<CompiledView, ViewError>, view_id: &str) -> ViewResult {
    result
        .map(Arc::new)
        .map_err(|err| Arc::new(err.in_template(view_id)))
}

// ---------------------------------------------------------------------------
// Page rendering
// ---------------------------------------------------------------------------

struct Page<'a> {
    base_dir_id: Option<&'a str>,
    model: &'a Value,
    mode: &'a str,
    containers: Option<&'a Containers>,
    rename: Rename<'a>,
}

impl Page<'_> {
    fn render(
        &self,
        view_name: &str,
        lookup: impl Fn(&str) -> Result<Arc<CompiledView>, ViewError>,
    ) -> Result<String, ViewError> {
        let view = lookup(&self.view_id(view_name))?;
        let partials = self.partials(&view, &lookup)?;
        let mut html = view.render(
            self.model,
            &RenderArgs {
                mode: self.mode,
                partials: &partials,
                containers: self.containers,
                ..Default::default()
            },
        );

        if let Some(layout_name) = view.layout() {
            let layout = lookup(&self.view_id(layout_name))?;
            let partials = self.partials(&layout, &lookup)?;
            html = layout.render(
                self.model,
                &RenderArgs {
                    mode: self.mode,
                    body: &html,
                    partials: &partials,
                    containers: self.containers,
                    ..Default::default()
                },
            );
        }
        Ok(html)
    }

    /// Each partial renders with its instance id as widget id and as the
    /// value of its base-prop dynamic key.
    fn partials(
        &self,
        view: &CompiledView,
        lookup: &impl Fn(&str) -> Result<Arc<CompiledView>, ViewError>,
    ) -> Result<Vec<String>, ViewError> {
        view.partials()
            .iter()
            .map(|partial| {
                let partial_view = lookup(&self.view_id(&partial.template))?;
                let mut dynamic_keys = DynamicKeys::new();
                if !partial.id.is_empty() {
                    let base_prop = partial_view
                        .mapping()
                        .base_prop
                        .clone()
                        .unwrap_or_else(|| fallback_base_prop(&partial.id));
                    dynamic_keys.insert(base_prop, partial.id.clone());
                }
                Ok(partial_view.render(
                    self.model,
                    &RenderArgs {
                        mode: self.mode,
                        containers: self.containers,
                        widget_id: &partial.id,
                        dynamic_keys: Some(&dynamic_keys),
                        ..Default::default()
                    },
                ))
            })
            .collect()
    }

    fn view_id(&self, name: &str) -> String {
        let name = match self.rename {
            Some(rename) => rename(name),
            None => name.to_string(),
        };
        let id = match self.base_dir_id {
            Some(base) if !base.is_empty() => format!("{}/{}", base, name),
            _ => name,
        };
        if id.ends_with(VIEW_EXT) {
            id
        } else {
            id + VIEW_EXT
        }
    }
}

fn fallback_base_prop(id: &str) -> String {
    let id = id.strip_prefix("widgets/").unwrap_or(id);
    let id = id.strip_suffix(VIEW_EXT).unwrap_or(id);
    id.replace('/', "_")
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ViewError> {
    let mut pending = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.to_string_lossy().ends_with(suffix)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    path.to_str()?.strip_suffix(suffix).map(PathBuf::from)
}
