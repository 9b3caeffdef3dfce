//! Folders: the file sets tracked on behalf of a component.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::naming::Naming;
use crate::base::{ComponentId, FileId, FolderId, OrderedRegistry, QualifiedName};
use crate::component::ExplicitFile;
use crate::config::{FolderOptions, LoaderConfig};
use crate::error::ConfigError;
use crate::resource::Registry;

/// How a folder finds its files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// The directory listing is authoritative.
    Automatic,
    /// Only files registered at declaration time are tracked.
    Explicit,
}

/// Files added and removed by a rescan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanDiff {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ScanDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A folder owned by a component.
#[derive(Debug)]
pub struct Folder {
    id: FolderId,
    path: PathBuf,
    component: ComponentId,
    namespace: QualifiedName,
    options: FolderOptions,
    files: OrderedRegistry<FileId>,
    explicit: Vec<ExplicitFile>,
}

impl Folder {
    pub(crate) fn new(
        id: FolderId,
        path: PathBuf,
        component: ComponentId,
        namespace: QualifiedName,
        options: FolderOptions,
        explicit: Vec<ExplicitFile>,
    ) -> Self {
        Self {
            id,
            path,
            component,
            namespace,
            options,
            files: OrderedRegistry::new(),
            explicit,
        }
    }

    pub fn id(&self) -> FolderId {
        self.id
    }

    /// Absolute path of the folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Namespace that inferred names are qualified with.
    pub fn namespace(&self) -> &QualifiedName {
        &self.namespace
    }

    pub fn options(&self) -> &FolderOptions {
        &self.options
    }

    pub fn scan_mode(&self) -> ScanMode {
        if self.options.automatic_scan {
            ScanMode::Automatic
        } else {
            ScanMode::Explicit
        }
    }

    /// Tracked files, in registration order.
    pub fn files(&self) -> &OrderedRegistry<FileId> {
        &self.files
    }

    /// `path` relative to this folder, if it lies inside it.
    pub fn relative_path_to<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.path).ok()
    }

    /// Resource names inferred for a folder-relative path.
    fn infer(&self, relative: &Path, naming: &dyn Naming) -> Option<QualifiedName> {
        let name = if self.options.nested_namespaces {
            naming.name_for(relative)?
        } else {
            naming.name_for(Path::new(relative.file_name()?))?
        };
        Some(self.namespace.join(&name))
    }

    /// Track the files registered at declaration time.
    pub(crate) fn register_explicit_files(&mut self, registry: &mut Registry, naming: &dyn Naming) {
        for index in 0..self.explicit.len() {
            self.track_explicit(index, registry, naming);
        }
        self.apply_preload(registry);
    }

    /// Track one declared file under its given or inferred names.
    fn track_explicit(&mut self, index: usize, registry: &mut Registry, naming: &dyn Naming) -> Option<PathBuf> {
        let explicit = &self.explicit[index];
        let path = self.path.join(explicit.path());
        let provides = if explicit.provides().is_empty() {
            match self.infer(explicit.path(), naming) {
                Some(name) => vec![name],
                None => {
                    warn!(path = %path.display(), "cannot infer a resource name, skipping file");
                    return None;
                }
            }
        } else {
            explicit.provides().to_vec()
        };
        let file = registry.track_file(&path, self.id, &provides, explicit.effect.clone());
        self.files.insert(file);
        Some(path)
    }

    /// Apply a fresh directory listing.
    ///
    /// New files are tracked under their inferred names, files gone from
    /// disk are untracked, and the closures of the folder's files are
    /// recomputed if anything changed. Declared files keep their declared
    /// names: one deleted from disk is untracked, and tracked again once it
    /// reappears.
    pub(crate) fn apply_scan(
        &mut self,
        listing: Vec<PathBuf>,
        registry: &mut Registry,
        naming: &dyn Naming,
    ) -> ScanDiff {
        let explicit: FxHashSet<PathBuf> = self
            .explicit
            .iter()
            .map(|file| self.path.join(file.path()))
            .collect();
        let listed: FxHashSet<&Path> = listing.iter().map(PathBuf::as_path).collect();
        let mut diff = ScanDiff::default();

        for file in self.files.to_vec() {
            let Some(source) = registry.files().get(file) else {
                continue;
            };
            let path = source.path().to_owned();
            // Declared files may use an extension the listing filters out.
            let present = listed.contains(path.as_path()) || (explicit.contains(&path) && path.is_file());
            if present {
                continue;
            }
            registry.untrack_file(file);
            self.files.remove(&file);
            diff.removed.push(path);
        }

        for index in 0..self.explicit.len() {
            let path = self.path.join(self.explicit[index].path());
            if registry.files().id_of(&path).is_some() || !path.is_file() {
                continue;
            }
            if let Some(path) = self.track_explicit(index, registry, naming) {
                diff.added.push(path);
            }
        }

        for path in &listing {
            if explicit.contains(path) || registry.files().id_of(path).is_some() {
                continue;
            }
            let Some(relative) = self.relative_path_to(path) else {
                continue;
            };
            let Some(name) = self.infer(relative, naming) else {
                warn!(path = %path.display(), "cannot infer a resource name, skipping file");
                continue;
            };
            let file = registry.track_file(path, self.id, &[name], None);
            self.files.insert(file);
            diff.added.push(path.clone());
        }

        if !diff.is_empty() {
            debug!(
                folder = %self.path.display(),
                added = diff.added.len(),
                removed = diff.removed.len(),
                "folder changed"
            );
            registry.refreeze(&self.files.to_vec());
        }
        self.apply_preload(registry);
        diff
    }

    fn apply_preload(&self, registry: &mut Registry) {
        if !self.options.preload {
            return;
        }
        for &file in &self.files {
            let resources = match registry.files().get(file) {
                Some(source) => source.resources().to_vec(),
                None => continue,
            };
            for resource in resources {
                registry.mark_preload(resource, true);
            }
        }
    }
}

/// List the source files under `root`, sorted by path.
pub fn list_source_files(root: &Path, config: &LoaderConfig) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ConfigError::Scan {
            path: root.to_owned(),
            source,
        })?;
        if entry.file_type().is_file() && config.is_source_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
