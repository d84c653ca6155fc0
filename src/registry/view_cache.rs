//! Thread-safe cache of compiled views.
//!
//! The registry writes here on init, register and file changes; renders
//! read from it. Failed compilations are cached as errors so a later render
//! reports why the view is unusable.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::render::CompiledView;
use crate::ViewError;

/// Outcome of compiling one view.
pub type ViewResult = Result<Arc<CompiledView>, Arc<ViewError>>;

#[derive(Debug, Clone)]
pub struct ViewEntry {
    pub view: ViewResult,
    /// Side-channel script attached to the view, kept across recompiles.
    pub script: Option<PathBuf>,
}

/// Compiled views keyed by view id.
/// Includes dirty tracking for change notification.
#[derive(Debug, Clone, Default)]
pub struct ViewCache {
    inner: Arc<DashMap<String, ViewEntry>>,
    /// Views that have been modified since last check.
    dirty: Arc<RwLock<HashSet<String>>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a compilation result, keeping any script already attached.
    pub fn store(&self, view_id: &str, view: ViewResult) {
        let mut dirty = self.dirty.write().expect("View dirty set poisoned");
        dirty.insert(view_id.to_string());
        self.inner
            .entry(view_id.to_string())
            .and_modify(|entry| entry.view = view.clone())
            .or_insert(ViewEntry { view, script: None });
    }

    pub fn get(&self, view_id: &str) -> Option<ViewEntry> {
        self.inner.get(view_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, view_id: &str) -> Option<ViewEntry> {
        let mut dirty = self.dirty.write().expect("View dirty set poisoned");
        dirty.insert(view_id.to_string());
        self.inner.remove(view_id).map(|(_, entry)| entry)
    }

    /// Attach or clear the script of a cached view. Returns false when the
    /// view is not cached.
    pub fn set_script(&self, view_id: &str, script: Option<PathBuf>) -> bool {
        match self.inner.get_mut(view_id) {
            Some(mut entry) => {
                entry.script = script;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, view_id: &str) -> bool {
        self.inner.contains_key(view_id)
    }

    /// Cached view ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a view has been stored or removed since last check.
    /// Clears the dirty flag for this view after reading.
    pub fn has_changed(&self, view_id: &str) -> bool {
        let mut dirty = self.dirty.write().expect("View dirty set poisoned");
        dirty.remove(view_id)
    }
}
