//! Tracked source files and their relation closures.
//!
//! Two files are related when they provide a common resource; a file's
//! closure is the transitive completion of that relation together with every
//! resource those files provide. Loading any resource of the closure loads
//! all of its files, so related definitions never bind half-way.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tracing::trace;

use super::binding::LoadEffect;
use super::tree::ResourceTree;
use crate::base::{FileId, FolderId, OrderedRegistry, ResourceId};

/// A source file providing one or more resources.
pub struct SourceFile {
    path: PathBuf,
    folder: FolderId,
    resources: OrderedRegistry<ResourceId>,
    loaded_at: Option<SystemTime>,
    has_run: bool,
    closure: Option<Arc<Closure>>,
    effect: Option<Arc<dyn LoadEffect>>,
    removed: bool,
}

impl SourceFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The folder that tracks this file.
    pub fn folder(&self) -> FolderId {
        self.folder
    }

    /// Resources provided by this file, in declaration order.
    pub fn resources(&self) -> &OrderedRegistry<ResourceId> {
        &self.resources
    }

    /// Modification time recorded when the file was last loaded.
    pub fn loaded_at(&self) -> Option<SystemTime> {
        self.loaded_at
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded_at.is_some()
    }

    /// True once the file has loaded successfully, even if it was unloaded
    /// since.
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// True if the cached closure was invalidated and not yet recomputed.
    pub fn is_dirty(&self) -> bool {
        self.closure.is_none()
    }

    pub(crate) fn effect(&self) -> Option<&Arc<dyn LoadEffect>> {
        self.effect.as_ref()
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("path", &self.path)
            .field("folder", &self.folder)
            .field("resources", &self.resources)
            .field("loaded_at", &self.loaded_at)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// The related-files and related-resources sets of a file.
#[derive(Debug, PartialEq, Eq)]
pub struct Closure {
    files: OrderedRegistry<FileId>,
    resources: OrderedRegistry<ResourceId>,
}

impl Closure {
    /// Related files, starting with the file the closure was computed for.
    pub fn files(&self) -> &OrderedRegistry<FileId> {
        &self.files
    }

    pub fn resources(&self) -> &OrderedRegistry<ResourceId> {
        &self.resources
    }
}

/// Every file tracked by the loader.
///
/// Assigns stable [`FileId`]s to paths. A removed file keeps its id slot but
/// no longer resolves by path; re-adding the path yields a fresh id.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<SourceFile>,
    by_path: IndexMap<PathBuf, FileId, FxBuildHasher>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `path`, or return its id if it is already tracked.
    pub(crate) fn register(
        &mut self,
        path: &Path,
        folder: FolderId,
        effect: Option<Arc<dyn LoadEffect>>,
    ) -> FileId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let id = FileId::new(self.files.len() as u32);
        self.files.push(SourceFile {
            path: path.to_owned(),
            folder,
            resources: OrderedRegistry::new(),
            loaded_at: None,
            has_run: false,
            closure: None,
            effect,
            removed: false,
        });
        self.by_path.insert(path.to_owned(), id);
        id
    }

    /// Look up a tracked path.
    pub fn id_of(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    /// Get a tracked file.
    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index()).filter(|file| !file.removed)
    }

    pub(crate) fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    /// Ids of every tracked file, in registration order.
    pub fn ids(&self) -> Vec<FileId> {
        self.by_path.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub(crate) fn add_resource(&mut self, id: FileId, resource: ResourceId) {
        self.files[id.index()].resources.insert(resource);
    }

    pub(crate) fn set_loaded(&mut self, id: FileId, loaded_at: Option<SystemTime>) {
        let file = &mut self.files[id.index()];
        file.has_run |= loaded_at.is_some();
        file.loaded_at = loaded_at;
    }

    /// Stop tracking a file. Returns the resources it provided.
    pub(crate) fn remove(&mut self, id: FileId) -> Vec<ResourceId> {
        let file = &mut self.files[id.index()];
        file.removed = true;
        file.loaded_at = None;
        file.closure = None;
        let resources = file.resources.to_vec();
        file.resources.clear();
        let path = file.path.clone();
        self.by_path.shift_remove(&path);
        resources
    }

    // ========================================================================
    // CLOSURES
    // ========================================================================

    /// Compute the closure of `id` by alternating breadth-first expansion
    /// between files and the resources they provide.
    pub fn compute_closure(&self, id: FileId, tree: &ResourceTree) -> Closure {
        let mut files = OrderedRegistry::new();
        let mut resources = OrderedRegistry::new();
        files.insert(id);

        let mut file_frontier = vec![id];
        while !file_frontier.is_empty() {
            let mut resource_frontier = Vec::new();
            for file in file_frontier.drain(..) {
                for &resource in self.file(file).resources() {
                    if resources.insert(resource) {
                        resource_frontier.push(resource);
                    }
                }
            }
            for resource in resource_frontier {
                for &file in tree.node(resource).files() {
                    if self.get(file).is_some() && files.insert(file) {
                        file_frontier.push(file);
                    }
                }
            }
        }

        trace!(
            file = %self.file(id).path.display(),
            files = files.len(),
            resources = resources.len(),
            "computed closure"
        );
        Closure { files, resources }
    }

    /// The memoized closure of `id`, computing it if it is dirty.
    pub fn closure(&mut self, id: FileId, tree: &ResourceTree) -> Arc<Closure> {
        if let Some(closure) = &self.file(id).closure {
            return Arc::clone(closure);
        }
        let closure = Arc::new(self.compute_closure(id, tree));
        self.files[id.index()].closure = Some(Arc::clone(&closure));
        closure
    }

    /// Mark the closure of `id` dirty.
    pub(crate) fn invalidate(&mut self, id: FileId) {
        self.files[id.index()].closure = None;
    }

    /// Mark dirty every cached closure that `id` belongs to, or that shares a
    /// resource with it.
    pub(crate) fn invalidate_related(&mut self, id: FileId, tree: &ResourceTree) {
        let mut stale = vec![id];
        if let Some(closure) = &self.file(id).closure {
            stale.extend(closure.files.iter().copied());
        }
        for &resource in self.file(id).resources() {
            for &file in tree.node(resource).files() {
                stale.push(file);
                if let Some(closure) = &self.file(file).closure {
                    stale.extend(closure.files.iter().copied());
                }
            }
        }
        for file in stale {
            self.invalidate(file);
        }
    }

    /// The file's current modification time on disk, if it can be read.
    pub fn modified_on_disk(&self, id: FileId) -> Option<SystemTime> {
        fs::metadata(&self.file(id).path)
            .and_then(|metadata| metadata.modified())
            .ok()
    }

    /// True if the file is loaded and changed on disk since.
    pub fn is_modified(&self, id: FileId) -> bool {
        match (self.file(id).loaded_at, self.modified_on_disk(id)) {
            (Some(loaded), Some(modified)) => modified > loaded,
            _ => false,
        }
    }
}
