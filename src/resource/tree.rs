//! The resource tree, a trie of namespaced names.

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smol_str::SmolStr;

use super::binding::Bindings;
use crate::base::{FileId, OrderedRegistry, QualifiedName, ResourceId};

/// A tracked, namespaced name that can be lazily bound.
#[derive(Clone, Debug)]
pub struct Resource {
    name: QualifiedName,
    parent: Option<ResourceId>,
    children: IndexMap<SmolStr, ResourceId, FxBuildHasher>,
    files: OrderedRegistry<FileId>,
    namespace: bool,
    preload: bool,
    pre_existing: bool,
    detached: bool,
}

impl Resource {
    fn new(name: QualifiedName, parent: Option<ResourceId>, pre_existing: bool) -> Self {
        Self {
            name,
            parent,
            children: IndexMap::default(),
            files: OrderedRegistry::new(),
            namespace: false,
            preload: false,
            pre_existing,
            detached: false,
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Look up a direct child by its final name segment.
    pub fn child(&self, segment: &str) -> Option<ResourceId> {
        self.children.get(segment).copied()
    }

    /// Children in creation order.
    pub fn children(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.children.values().copied()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Files providing this resource.
    pub fn files(&self) -> &OrderedRegistry<FileId> {
        &self.files
    }

    /// True if this resource acts as a namespace for other resources.
    pub fn is_namespace(&self) -> bool {
        self.namespace
    }

    /// True if the resource must be bound eagerly.
    pub fn is_preload(&self) -> bool {
        self.preload
    }

    /// True if the name was bound before tracking began. Such bindings are
    /// never released.
    pub fn is_pre_existing(&self) -> bool {
        self.pre_existing
    }

    /// True if no file provides this resource; loading it synthesizes an
    /// empty binding.
    pub fn is_implicitly_defined(&self) -> bool {
        !self.is_root() && self.files.is_empty()
    }
}

/// Trie of [`Resource`] nodes rooted at the global resource.
///
/// Nodes live in an arena; a removed node is detached from its parent and
/// its id no longer resolves.
#[derive(Clone, Debug)]
pub struct ResourceTree {
    nodes: Vec<Resource>,
}

impl ResourceTree {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Resource::new(QualifiedName::root(), None, true)],
        }
    }

    pub fn root(&self) -> ResourceId {
        ResourceId::new(0)
    }

    /// Get a live resource.
    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.nodes.get(id.index()).filter(|node| !node.detached)
    }

    pub(crate) fn node(&self, id: ResourceId) -> &Resource {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.nodes[id.index()]
    }

    /// Walk the tree to `name` without creating anything.
    pub fn find(&self, name: &QualifiedName) -> Option<ResourceId> {
        let mut current = self.root();
        for segment in name.segments() {
            current = self.node(current).child(segment)?;
        }
        Some(current)
    }

    /// Walk the tree to `name`, creating any missing segments.
    ///
    /// A created node is pre-existing if `bindings` already holds its name.
    pub fn get_or_create(&mut self, name: &QualifiedName, bindings: &Bindings) -> ResourceId {
        let mut current = self.root();
        for prefix in name.prefixes() {
            current = match self.node(current).child(prefix.base()) {
                Some(child) => child,
                None => {
                    let id = ResourceId::new(self.nodes.len() as u32);
                    let segment = SmolStr::new(prefix.base());
                    let pre_existing = bindings.contains(&prefix);
                    self.nodes.push(Resource::new(prefix, Some(current), pre_existing));
                    self.node_mut(current).children.insert(segment, id);
                    id
                }
            };
        }
        current
    }

    /// All live descendants of `id` in pre-order (excluding `id` itself).
    pub fn descendants(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut result = Vec::new();
        let mut stack: Vec<ResourceId> = self.node(id).children().collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            result.push(next);
            let node = self.node(next);
            stack.extend(node.children.values().rev().copied());
        }
        result
    }

    /// Number of live resources, including the root.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| !node.detached).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add_file(&mut self, id: ResourceId, file: FileId) {
        self.node_mut(id).files.insert(file);
    }

    /// Stop tracking `file` for `id`. Returns true if no file is left.
    pub(crate) fn remove_file(&mut self, id: ResourceId, file: FileId) -> bool {
        let node = self.node_mut(id);
        node.files.remove(&file);
        node.files.is_empty()
    }

    pub(crate) fn set_namespace(&mut self, id: ResourceId) {
        self.node_mut(id).namespace = true;
    }

    pub(crate) fn set_preload(&mut self, id: ResourceId, preload: bool) {
        self.node_mut(id).preload = preload;
    }

    /// Detach a childless resource from its parent.
    pub(crate) fn detach(&mut self, id: ResourceId) {
        let node = self.node_mut(id);
        if node.detached || node.parent.is_none() || !node.children.is_empty() {
            return;
        }
        node.detached = true;
        let segment = SmolStr::new(node.name.base());
        if let Some(parent) = node.parent {
            self.node_mut(parent).children.shift_remove(&segment);
        }
    }
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new()
    }
}
