//! Loading, unloading and reloading resources.
//!
//! [`Registry`] ties the resource tree, the tracked files and the binding
//! table together. Every operation keeps two invariants: a binding only
//! exists while its parent is bound, and a failed load leaves no partial
//! binding behind.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use super::binding::{Binding, Bindings, DefinitionReader, LoadContext, LoadEffect};
use super::files::{Closure, FileRegistry};
use super::tree::{Resource, ResourceTree};
use crate::base::{FileId, FolderId, QualifiedName, ResourceId};
use crate::error::LoadError;

/// Resource tree, tracked files and bindings of one loader.
pub struct Registry {
    tree: ResourceTree,
    files: FileRegistry,
    bindings: Bindings,
    default_effect: Arc<dyn LoadEffect>,
    reloadable_extensions: Option<Vec<String>>,
    reloading: Vec<FileId>,
}

impl Registry {
    /// Create a registry over an existing binding table. Names already bound
    /// are pre-existing.
    pub fn new(bindings: Bindings) -> Self {
        Self {
            tree: ResourceTree::new(),
            files: FileRegistry::new(),
            bindings,
            default_effect: Arc::new(DefinitionReader),
            reloadable_extensions: None,
            reloading: Vec::new(),
        }
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Replace the effect used for files without one of their own.
    pub fn set_default_effect(&mut self, effect: Arc<dyn LoadEffect>) {
        self.default_effect = effect;
    }

    pub(crate) fn default_effect(&self) -> &Arc<dyn LoadEffect> {
        &self.default_effect
    }

    /// Restrict which files run again on reload to those with one of
    /// `extensions`. Other files only run the first time they load. `None`
    /// makes every file reloadable.
    pub fn set_reloadable_extensions(&mut self, extensions: Option<Vec<String>>) {
        self.reloadable_extensions = extensions;
    }

    fn is_reloadable(&self, path: &Path) -> bool {
        let Some(extensions) = &self.reloadable_extensions else {
            return true;
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|known| known == ext))
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.tree.get(id)
    }

    /// Give up the registry, keeping only its bindings.
    pub(crate) fn into_bindings(self) -> Bindings {
        self.bindings
    }

    // ========================================================================
    // TRACKING
    // ========================================================================

    /// Track `path` as providing `provides`.
    ///
    /// Every proper ancestor of a provided name becomes a namespace.
    pub(crate) fn track_file(
        &mut self,
        path: &Path,
        folder: FolderId,
        provides: &[QualifiedName],
        effect: Option<Arc<dyn LoadEffect>>,
    ) -> FileId {
        let file = self.files.register(path, folder, effect);
        for name in provides {
            let resource = self.tree.get_or_create(name, &self.bindings);
            self.tree.add_file(resource, file);
            self.files.add_resource(file, resource);

            let mut ancestor = self.tree.node(resource).parent();
            while let Some(id) = ancestor {
                if self.tree.node(id).is_root() {
                    break;
                }
                self.tree.set_namespace(id);
                ancestor = self.tree.node(id).parent();
            }
        }
        self.files.invalidate_related(file, &self.tree);
        trace!(path = %path.display(), resources = provides.len(), "tracking file");
        file
    }

    /// Stop tracking a file.
    ///
    /// Resources it provided are unloaded. A resource left without files
    /// reverts to an implicitly defined namespace, or is removed if it is
    /// not one.
    pub(crate) fn untrack_file(&mut self, file: FileId) {
        if self.files.get(file).is_none() {
            return;
        }
        self.files.invalidate_related(file, &self.tree);
        for resource in self.files.file(file).resources().to_vec() {
            self.unload(resource);
        }

        for resource in self.files.remove(file) {
            if !self.tree.remove_file(resource, file) {
                continue;
            }
            if !self.tree.node(resource).is_namespace() {
                self.remove(resource);
            }
        }
    }

    /// Unload and forget a resource.
    ///
    /// A resource that still has children is kept as an implicitly defined
    /// namespace. Parents emptied by the removal are removed in turn.
    pub fn remove(&mut self, resource: ResourceId) {
        if self.tree.get(resource).is_none_or(Resource::is_root) {
            return;
        }
        self.unload(resource);
        let node = self.tree.node(resource);
        if node.has_children() {
            warn!(resource = %node.name(), "removed resource still has children, keeping it as a namespace");
            self.tree.set_namespace(resource);
            return;
        }

        let parent = node.parent();
        let files = node.files().to_vec();
        for file in files {
            self.tree.remove_file(resource, file);
        }
        debug!(resource = %self.tree.node(resource).name(), "removing resource");
        self.tree.detach(resource);

        if let Some(parent) = parent {
            let node = self.tree.node(parent);
            if !node.is_root() && !node.has_children() && node.files().is_empty() && !node.is_pre_existing() {
                self.remove(parent);
            }
        }
    }

    // ========================================================================
    // BINDING QUERIES
    // ========================================================================

    pub fn is_bound(&self, resource: ResourceId) -> bool {
        self.bindings.contains(self.tree.node(resource).name())
    }

    /// The live binding of a resource, provided every ancestor is bound too.
    pub fn resolve_binding(&self, resource: ResourceId) -> Option<Arc<Binding>> {
        let name = self.tree.node(resource).name();
        if name.is_root() {
            return self.bindings.get(name).cloned();
        }
        let mut binding = None;
        for prefix in name.prefixes() {
            binding = Some(self.bindings.get(&prefix)?);
        }
        binding.cloned()
    }

    // ========================================================================
    // LOAD / UNLOAD
    // ========================================================================

    /// Bind a resource, loading its parent first.
    ///
    /// An implicitly defined resource gets an empty binding, after which its
    /// preload descendants are loaded. Otherwise one of its files is
    /// reloaded, which brings in every related file.
    pub fn load(&mut self, resource: ResourceId) -> Result<(), LoadError> {
        if self.is_bound(resource) {
            return Ok(());
        }
        let node = self.tree.node(resource);
        if let Some(parent) = node.parent() {
            self.load(parent)?;
        }
        if self.is_bound(resource) {
            return Ok(());
        }

        let node = self.tree.node(resource);
        let name = node.name().clone();
        trace!(resource = %name, "loading resource");
        if node.is_implicitly_defined() {
            self.bindings.insert_empty(name);
            for descendant in self.tree.descendants(resource) {
                if self.tree.node(descendant).is_preload() {
                    self.load(descendant)?;
                }
            }
            return Ok(());
        }

        if let Some(&file) = node.files().first() {
            self.reload_file(file)?;
        }
        if !self.is_bound(resource) {
            return Err(LoadError::NotDefined { name });
        }
        Ok(())
    }

    /// Release a resource's binding, children first.
    ///
    /// Pre-existing bindings are kept along with the load stamps of their
    /// files. Otherwise the resource's files are marked not loaded.
    pub fn unload(&mut self, resource: ResourceId) {
        let node = self.tree.node(resource);
        if !self.bindings.contains(node.name()) {
            return;
        }
        let children: Vec<_> = node.children().collect();
        for child in children {
            self.unload(child);
        }

        let node = self.tree.node(resource);
        if node.is_pre_existing() {
            return;
        }
        for &file in node.files() {
            self.files.set_loaded(file, None);
        }
        debug!(resource = %node.name(), "unloading resource");
        let name = node.name().clone();
        self.bindings.remove(&name);
    }

    /// Unload then load a resource.
    pub fn reload(&mut self, resource: ResourceId) -> Result<(), LoadError> {
        self.unload(resource);
        self.load(resource)
    }

    /// Reload a file together with every related file.
    ///
    /// Every resource of the closure is unloaded, unbound ancestors outside
    /// the closure are bound, and the effect of each closure file runs in
    /// order. On failure every closure resource is unloaded again.
    pub fn reload_file(&mut self, file: FileId) -> Result<(), LoadError> {
        let closure = self.files.closure(file, &self.tree);
        if let Some(&busy) = closure.files().iter().find(|&&file| self.reloading.contains(&file)) {
            return Err(LoadError::CircularLoad {
                path: self.files.file(busy).path().to_owned(),
            });
        }
        for &resource in closure.resources() {
            self.unload(resource);
        }
        for &file in closure.files() {
            self.files.set_loaded(file, None);
        }

        let mut batch: FxHashSet<QualifiedName> = FxHashSet::default();
        for &resource in closure.resources() {
            batch.insert(self.tree.node(resource).name().clone());
            let mut ancestor = self.tree.node(resource).parent();
            while let Some(id) = ancestor {
                let node = self.tree.node(id);
                if node.is_implicitly_defined() {
                    batch.insert(node.name().clone());
                }
                ancestor = node.parent();
            }
        }

        self.reloading.extend(closure.files().iter().copied());
        let result = self
            .bind_outer_ancestors(&closure, &batch)
            .and_then(|()| {
                debug!(
                    file = %self.files.file(file).path().display(),
                    related = closure.files().len(),
                    "reloading file"
                );
                self.run_effects(closure.files().iter().copied(), &batch)
            });
        self.reloading.retain(|file| !closure.files().contains(file));

        if let Err(err) = result {
            for &resource in closure.resources() {
                self.unload(resource);
            }
            for &file in closure.files() {
                self.files.set_loaded(file, None);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Bind the unbound ancestors of closure resources that no closure file
    /// defines, outermost first.
    ///
    /// An ancestor nested under a batch name (`A::B` between a batch `A` and
    /// a batch `A::B::C`) needs that batch name bound first, so the batch
    /// names above it are bound empty and reopened later by their files.
    fn bind_outer_ancestors(
        &mut self,
        closure: &Closure,
        batch: &FxHashSet<QualifiedName>,
    ) -> Result<(), LoadError> {
        for &resource in closure.resources() {
            let mut chain = Vec::new();
            let mut ancestor = self.tree.node(resource).parent();
            while let Some(id) = ancestor {
                if self.tree.node(id).is_root() {
                    break;
                }
                chain.push(id);
                ancestor = self.tree.node(id).parent();
            }

            let mut pending = Vec::new();
            for id in chain.into_iter().rev() {
                if self.is_bound(id) {
                    continue;
                }
                let name = self.tree.node(id).name().clone();
                if batch.contains(&name) {
                    pending.push(name);
                    continue;
                }
                for name in pending.drain(..) {
                    self.bindings.insert_empty(name);
                }
                self.load(id)?;
            }
        }
        Ok(())
    }

    fn run_effects(
        &mut self,
        files: impl Iterator<Item = FileId>,
        batch: &FxHashSet<QualifiedName>,
    ) -> Result<(), LoadError> {
        for file in files {
            let source = self.files.file(file);
            let path = source.path().to_owned();
            let provides: Vec<QualifiedName> = source
                .resources()
                .iter()
                .map(|&resource| self.tree.node(resource).name().clone())
                .collect();
            let effect = source
                .effect()
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.default_effect));

            if source.has_run() && !self.is_reloadable(&path) {
                trace!(path = %path.display(), "skipping non-reloadable file");
            } else {
                let mut cx = LoadContext::new(&path, &provides, batch, &mut self.bindings);
                effect.load(&mut cx)?;
            }

            let stamp = self.files.modified_on_disk(file).unwrap_or_else(SystemTime::now);
            self.files.set_loaded(file, Some(stamp));
        }
        Ok(())
    }

    // ========================================================================
    // PRELOAD
    // ========================================================================

    /// Set the preload flag on a resource and all of its descendants.
    pub fn mark_preload(&mut self, resource: ResourceId, preload: bool) {
        self.tree.set_preload(resource, preload);
        for descendant in self.tree.descendants(resource) {
            self.tree.set_preload(descendant, preload);
        }
    }

    /// Load every preload resource that is not bound. Returns the resources
    /// that were loaded.
    pub fn reload_preloaded(&mut self) -> Result<Vec<ResourceId>, LoadError> {
        let mut loaded = Vec::new();
        for resource in self.tree.descendants(self.tree.root()) {
            if self.tree.get(resource).is_some_and(Resource::is_preload) && !self.is_bound(resource) {
                self.load(resource)?;
                loaded.push(resource);
            }
        }
        Ok(loaded)
    }

    /// Apply the files extending pre-existing resources.
    pub fn load_extensions(&mut self) -> Result<(), LoadError> {
        for resource in self.tree.descendants(self.tree.root()) {
            let node = self.tree.node(resource);
            if !node.is_pre_existing() {
                continue;
            }
            let pending = node.files().iter().copied().find(|&file| !self.files.file(file).is_loaded());
            if let Some(file) = pending {
                self.reload_file(file)?;
            }
        }
        Ok(())
    }

    /// Recompute the closures of a set of files after their folder changed.
    pub(crate) fn refreeze(&mut self, files: &[FileId]) {
        for &file in files {
            self.files.invalidate(file);
        }
        for &file in files {
            self.files.closure(file, &self.tree);
        }
    }

    /// Reload a file if it changed on disk since it was loaded. Returns the
    /// closure that was reloaded.
    pub(crate) fn reload_if_modified(&mut self, file: FileId) -> Result<Option<Arc<Closure>>, LoadError> {
        if !self.files.is_modified(file) {
            return Ok(None);
        }
        let closure = self.files.closure(file, &self.tree);
        self.reload_file(file)?;
        Ok(Some(closure))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Bindings::new())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.tree.len())
            .field("files", &self.files.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
