//! The loader context: declarations, startup, resolution and maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use super::folder::{Folder, ScanDiff, ScanMode, list_source_files};
use super::naming::{CamelCaseNaming, Naming};
use crate::base::{ComponentId, FileId, FolderId, OrderedRegistry, QualifiedName, ResourceId};
use crate::component::{Component, ComponentGraph, ComponentGraphBuilder, ComponentHandle, ExplicitFile};
use crate::config::{FolderOptions, LoaderConfig};
use crate::error::{ConfigError, ProtectionError, ResolutionError, Result};
use crate::resource::{Binding, Bindings, LoadEffect, Registry, Resource};

/// Outcome of [`Loader::on_unresolved_name`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The name was tracked and is now bound.
    Bound {
        name: QualifiedName,
        binding: Arc<Binding>,
    },
    /// Nobody tracks the name; the caller's own fallback should run.
    Continue,
}

/// What [`Loader::update`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Files that appeared in reloadable folders.
    pub added: Vec<PathBuf>,
    /// Files that disappeared from reloadable folders.
    pub removed: Vec<PathBuf>,
    /// Loaded files reloaded because they changed on disk.
    pub reloaded: Vec<PathBuf>,
    /// Preload resources that had to be bound again.
    pub preloaded: Vec<QualifiedName>,
}

impl UpdateReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.reloaded.is_empty()
            && self.preloaded.is_empty()
    }
}

/// The loader context.
///
/// Components are declared first; [`start`](Loader::start) freezes them,
/// scans their folders and binds whatever must be bound eagerly. Afterwards
/// names are bound lazily through [`resolve`](Loader::resolve) or
/// [`on_unresolved_name`](Loader::on_unresolved_name).
///
/// # Example
///
/// ```no_run
/// use lazytree::{FolderOptions, Loader, LoaderConfig};
///
/// let mut loader = Loader::new(LoaderConfig::new().with_base("app"));
/// loader
///     .declare_component("framework")?
///     .namespace("Framework")?
///     .folder("framework", FolderOptions::default())?;
/// loader.start()?;
///
/// let klass = loader.resolve("Framework::Klass")?;
/// assert!(klass.has_member("standard_method"));
/// # Ok::<(), lazytree::LoaderError>(())
/// ```
pub struct Loader {
    config: LoaderConfig,
    naming: Arc<dyn Naming>,
    builder: Option<ComponentGraphBuilder>,
    graph: ComponentGraph,
    folders: Vec<Folder>,
    registry: Registry,
    loaded_components: FxHashSet<ComponentId>,
}

impl Loader {
    /// Create a loader with an empty binding table.
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_bindings(config, Bindings::new())
    }

    /// Create a loader over an existing binding table. Every name already
    /// bound is pre-existing and is never released.
    pub fn with_bindings(config: LoaderConfig, bindings: Bindings) -> Self {
        let mut registry = Registry::new(bindings);
        registry.set_reloadable_extensions(config.reloadable_extensions.clone());
        Self {
            builder: Some(ComponentGraphBuilder::new(config.base.clone())),
            config,
            naming: Arc::new(CamelCaseNaming),
            graph: ComponentGraph::default(),
            folders: Vec::new(),
            registry,
            loaded_components: FxHashSet::default(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Replace the effect used for files without one of their own.
    pub fn set_default_effect(&mut self, effect: impl LoadEffect + 'static) {
        self.registry.set_default_effect(Arc::new(effect));
    }

    /// Replace how file paths map to resource names.
    pub fn set_naming(&mut self, naming: impl Naming + 'static) {
        self.naming = Arc::new(naming);
    }

    pub fn is_started(&self) -> bool {
        self.builder.is_none()
    }

    // ========================================================================
    // DECLARATIONS
    // ========================================================================

    /// Declare a component.
    pub fn declare_component(&mut self, id: &str) -> Result<ComponentHandle<'_>> {
        match &mut self.builder {
            Some(builder) => builder.declare(id),
            None => Err(ProtectionError::Started.into()),
        }
    }

    /// Reopen a component's declaration. After startup the handle only
    /// reports protection errors.
    pub fn component_mut(&mut self, id: &str) -> Option<ComponentHandle<'_>> {
        match &mut self.builder {
            Some(builder) => builder.component_mut(id),
            None => self.graph.component_mut(id),
        }
    }

    /// A finalized component.
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.graph.get(id)
    }

    /// The component graph (empty until started).
    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ========================================================================
    // STARTUP
    // ========================================================================

    /// Finalize the component graph, scan every folder and bind eagerly
    /// loaded resources.
    ///
    /// Folders are created in component load order. Directory listings are
    /// collected in parallel, then applied one folder at a time.
    pub fn start(&mut self) -> Result<()> {
        let builder = self.builder.take().ok_or(ProtectionError::Started)?;
        self.graph = builder.finalize()?;

        for component_id in self.graph.load_order() {
            let component = self.graph.component(component_id);
            if let Some(file) = &component.namespace_file {
                if component.namespace().is_root() {
                    warn!(component = %component.id(), "namespace file given without a namespace, ignoring it");
                } else {
                    let mut provides = OrderedRegistry::new();
                    provides.insert(component.namespace().clone());
                    let explicit = ExplicitFile {
                        provides,
                        ..file.clone()
                    };
                    let id = FolderId::new(self.folders.len() as u32);
                    let mut folder = Folder::new(
                        id,
                        component.base().to_owned(),
                        component_id,
                        component.namespace().clone(),
                        FolderOptions::explicit(),
                        vec![explicit],
                    );
                    folder.register_explicit_files(&mut self.registry, self.naming.as_ref());
                    self.folders.push(folder);
                }
            }
            for decl in component.folders() {
                let path = component.base().join(decl.path());
                if !path.is_dir() {
                    return Err(ConfigError::MissingFolder { path }.into());
                }
                let namespace = match &decl.options().namespace_override {
                    Some(token) => QualifiedName::from_token(token).map_err(|reason| {
                        ConfigError::InvalidName {
                            name: token.clone(),
                            reason,
                        }
                    })?,
                    None => component.namespace().clone(),
                };
                let id = FolderId::new(self.folders.len() as u32);
                let mut folder = Folder::new(
                    id,
                    path,
                    component_id,
                    namespace,
                    decl.options().clone(),
                    decl.files().to_vec(),
                );
                folder.register_explicit_files(&mut self.registry, self.naming.as_ref());
                self.folders.push(folder);
            }
        }

        self.rescan(|_| true)?;
        self.registry.load_extensions()?;
        self.registry.reload_preloaded()?;

        info!(
            components = self.graph.len(),
            folders = self.folders.len(),
            files = self.registry.files().len(),
            resources = self.registry.tree().len(),
            "loader started"
        );
        Ok(())
    }

    /// List every selected automatic folder in parallel, then apply the
    /// listings in folder order.
    fn rescan(&mut self, select: impl Fn(&Folder) -> bool + Sync) -> Result<ScanDiff> {
        let config = &self.config;
        let listings: Vec<_> = self
            .folders
            .par_iter()
            .map(|folder| {
                if folder.scan_mode() == ScanMode::Automatic && select(folder) {
                    list_source_files(folder.path(), config).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect();

        let mut total = ScanDiff::default();
        for (folder, listing) in self.folders.iter_mut().zip(listings) {
            if let Some(listing) = listing? {
                let diff = folder.apply_scan(listing, &mut self.registry, self.naming.as_ref());
                total.added.extend(diff.added);
                total.removed.extend(diff.removed);
            }
        }
        Ok(total)
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Bind `name` if needed and return its binding.
    pub fn resolve(&mut self, name: &str) -> Result<Arc<Binding>> {
        let name = parse_resource_name(name)?;
        self.resolve_name(&name)
    }

    /// [`resolve`](Self::resolve) for an already parsed name.
    ///
    /// Names bound outside of any component (pre-existing globals) resolve
    /// to their binding without being tracked.
    pub fn resolve_name(&mut self, name: &QualifiedName) -> Result<Arc<Binding>> {
        let Some(resource) = self.registry.tree().find(name) else {
            return self
                .registry
                .bindings()
                .get(name)
                .cloned()
                .ok_or_else(|| ResolutionError::NotFound { name: name.clone() }.into());
        };
        self.registry.load(resource)?;
        self.registry
            .resolve_binding(resource)
            .ok_or_else(|| ResolutionError::NotFound { name: name.clone() }.into())
    }

    /// Hook for a host that failed to find `name` while evaluating inside
    /// `scope`.
    ///
    /// The name is looked up within `scope` first and then in each enclosing
    /// namespace out to the root. The first tracked candidate is loaded.
    pub fn on_unresolved_name(&mut self, scope: &str, name: &str) -> Result<Resolution> {
        let scope = QualifiedName::from_token(scope).map_err(|reason| ResolutionError::InvalidName {
            name: scope.to_string(),
            reason,
        })?;
        let name = parse_resource_name(name)?;

        let mut enclosing = Some(scope);
        while let Some(scope) = enclosing {
            let candidate = scope.join(&name);
            if self.registry.tree().find(&candidate).is_some() {
                debug!(name = %candidate, "binding unresolved name");
                let binding = self.resolve_name(&candidate)?;
                return Ok(Resolution::Bound {
                    name: candidate,
                    binding,
                });
            }
            enclosing = scope.parent();
        }
        Ok(Resolution::Continue)
    }

    /// Look up a tracked resource without loading it.
    pub fn find(&self, name: &str) -> Option<&Resource> {
        let name = QualifiedName::parse(name).ok()?;
        let id = self.registry.tree().find(&name)?;
        self.registry.tree().get(id)
    }

    /// The current binding of `name`, without loading anything.
    pub fn binding(&self, name: &str) -> Option<Arc<Binding>> {
        let name = QualifiedName::parse(name).ok()?;
        match self.registry.tree().find(&name) {
            Some(id) => self.registry.resolve_binding(id),
            None => self.registry.bindings().get(&name).cloned(),
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.binding(name).is_some()
    }

    /// Release the binding of a tracked resource and its children.
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let resource = self.tracked(name)?;
        self.registry.unload(resource);
        Ok(())
    }

    /// Unload then load a tracked resource.
    pub fn reload(&mut self, name: &str) -> Result<Arc<Binding>> {
        let resource = self.tracked(name)?;
        self.registry.reload(resource)?;
        self.resolve(name)
    }

    fn tracked(&self, name: &str) -> Result<ResourceId> {
        let name = parse_resource_name(name)?;
        match self.registry.tree().find(&name) {
            Some(id) => Ok(id),
            None => Err(ResolutionError::NotFound { name }.into()),
        }
    }

    /// Eagerly load a component: its dependencies, every resource of its
    /// folders, then its children.
    pub fn load_component(&mut self, id: &str) -> Result<()> {
        let component = self
            .graph
            .id_of(id)
            .ok_or_else(|| ResolutionError::UnknownComponent { id: id.into() })?;
        self.load_component_id(component)
    }

    fn load_component_id(&mut self, component: ComponentId) -> Result<()> {
        if !self.loaded_components.insert(component) {
            return Ok(());
        }
        let dependencies = self.graph.component(component).dependencies().to_vec();
        for dependency in dependencies {
            self.load_component_id(dependency)?;
        }

        let mut resources = Vec::new();
        for folder in self.folders.iter().filter(|folder| folder.component() == component) {
            for &file in folder.files() {
                if let Some(source) = self.registry.files().get(file) {
                    resources.extend(source.resources().iter().copied());
                }
            }
        }
        for resource in resources {
            if let Err(err) = self.registry.load(resource) {
                self.loaded_components.remove(&component);
                return Err(err.into());
            }
        }
        debug!(component = %self.graph.component(component).id(), "component loaded");

        let children = self.graph.component(component).children().to_vec();
        for child in children {
            self.load_component_id(child)?;
        }
        Ok(())
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Bring the loader in line with the disk.
    ///
    /// Reloadable folders are rescanned; loaded files of reloadable folders
    /// that changed since they were loaded are reloaded, each closure at most
    /// once; preload resources left unbound are bound again.
    pub fn update(&mut self) -> Result<UpdateReport> {
        if !self.is_started() {
            return Ok(UpdateReport::default());
        }
        let diff = self.rescan(|folder| folder.options().reloadable)?;
        let mut report = UpdateReport {
            added: diff.added,
            removed: diff.removed,
            ..UpdateReport::default()
        };

        let mut reloaded: FxHashSet<FileId> = FxHashSet::default();
        for file in self.registry.files().ids() {
            if reloaded.contains(&file) {
                continue;
            }
            let reloadable = self
                .registry
                .files()
                .get(file)
                .and_then(|source| self.folders.get(source.folder().index()))
                .is_some_and(|folder| folder.options().reloadable);
            if !reloadable {
                continue;
            }
            if let Some(closure) = self.registry.reload_if_modified(file)? {
                reloaded.extend(closure.files().iter().copied());
                report
                    .reloaded
                    .push(self.registry.files().file(file).path().to_owned());
            }
        }

        for resource in self.registry.reload_preloaded()? {
            report
                .preloaded
                .push(self.registry.tree().node(resource).name().clone());
        }

        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                reloaded = report.reloaded.len(),
                preloaded = report.preloaded.len(),
                "loader updated"
            );
        }
        Ok(report)
    }

    /// Release every binding the loader created and start over with no
    /// components. Pre-existing bindings survive.
    pub fn reset(&mut self) {
        let root = self.registry.tree().root();
        self.registry.unload(root);

        let config = self.config.clone();
        let naming = Arc::clone(&self.naming);
        let effect = Arc::clone(self.registry.default_effect());
        let registry = std::mem::take(&mut self.registry);

        *self = Self::with_bindings(config, registry.into_bindings());
        self.naming = naming;
        self.registry.set_default_effect(effect);
        debug!("loader reset");
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("started", &self.is_started())
            .field("components", &self.graph.len())
            .field("folders", &self.folders.len())
            .field("registry", &self.registry)
            .finish()
    }
}

fn parse_resource_name(name: &str) -> Result<QualifiedName> {
    QualifiedName::parse(name).map_err(|reason| {
        ResolutionError::InvalidName {
            name: name.to_string(),
            reason,
        }
        .into()
    })
}
