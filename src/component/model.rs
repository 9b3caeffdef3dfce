//! Components and their declaration handles.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smol_str::SmolStr;

use crate::base::{ComponentId, OrderedRegistry, QualifiedName, validate_component_id};
use crate::config::FolderOptions;
use crate::error::{ConfigError, ProtectionError, Result};
use crate::resource::LoadEffect;

/// A named unit owning folders, declared dependencies and a namespace.
///
/// Components are created by [`ComponentGraphBuilder::declare`](super::ComponentGraphBuilder::declare)
/// or synthesized as placeholders to complete the id hierarchy. They can only
/// be modified until the graph is finalized.
pub struct Component {
    pub(crate) id: SmolStr,
    pub(crate) base: PathBuf,
    pub(crate) namespace_token: Option<QualifiedName>,
    pub(crate) namespace: QualifiedName,
    pub(crate) namespace_file: Option<ExplicitFile>,
    pub(crate) dependency_ids: OrderedRegistry<SmolStr>,
    pub(crate) dependencies: Vec<ComponentId>,
    pub(crate) folders: Vec<FolderDecl>,
    pub(crate) parent: Option<ComponentId>,
    pub(crate) children: Vec<ComponentId>,
    pub(crate) placeholder: bool,
    pub(crate) frozen: bool,
}

impl Component {
    pub(crate) fn new(id: impl Into<SmolStr>, base: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            base: base.into(),
            namespace_token: None,
            namespace: QualifiedName::root(),
            namespace_file: None,
            dependency_ids: OrderedRegistry::new(),
            dependencies: Vec::new(),
            folders: Vec::new(),
            parent: None,
            children: Vec::new(),
            placeholder: false,
            frozen: false,
        }
    }

    pub(crate) fn placeholder(id: impl Into<SmolStr>, base: impl Into<PathBuf>) -> Self {
        Self {
            placeholder: true,
            ..Self::new(id, base)
        }
    }

    /// The dotted id, e.g. `framework.extensions`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory that relative folder paths are resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The namespace token declared on this component, if any.
    pub fn namespace_token(&self) -> Option<&QualifiedName> {
        self.namespace_token.as_ref()
    }

    /// The resolved namespace: the tokens of every ancestor and of this
    /// component, outermost first. The root name until the graph is finalized.
    pub fn namespace(&self) -> &QualifiedName {
        &self.namespace
    }

    /// File defining the component's namespace, relative to its base. Without
    /// one the namespace is bound as an empty binding.
    pub fn namespace_file(&self) -> Option<&Path> {
        self.namespace_file.as_ref().map(ExplicitFile::path)
    }

    /// Dependency ids as declared.
    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.dependency_ids.iter().map(|id| id.as_str())
    }

    /// Resolved dependencies (empty until finalized).
    pub fn dependencies(&self) -> &[ComponentId] {
        &self.dependencies
    }

    pub fn folders(&self) -> &[FolderDecl] {
        &self.folders
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    /// True if the component was synthesized to fill a gap in the hierarchy.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn protect_from_modification(&self) -> Result<(), ProtectionError> {
        if self.frozen {
            return Err(ProtectionError::Frozen { id: self.id.clone() });
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("dependencies", &self.dependency_ids)
            .field("folders", &self.folders.len())
            .field("placeholder", &self.placeholder)
            .field("frozen", &self.frozen)
            .finish()
    }
}

// ============================================================================
// FOLDER DECLARATIONS
// ============================================================================

/// A folder as declared on a component, before it is scanned.
#[derive(Clone, Debug)]
pub struct FolderDecl {
    pub(crate) path: PathBuf,
    pub(crate) options: FolderOptions,
    pub(crate) files: Vec<ExplicitFile>,
}

impl FolderDecl {
    /// Path as declared (relative paths are resolved against the component base).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &FolderOptions {
        &self.options
    }

    /// Files registered explicitly with [`FolderHandle::file`].
    pub fn files(&self) -> &[ExplicitFile] {
        &self.files
    }
}

/// A file registered explicitly on a folder.
#[derive(Clone)]
pub struct ExplicitFile {
    pub(crate) path: PathBuf,
    pub(crate) provides: OrderedRegistry<QualifiedName>,
    pub(crate) effect: Option<Arc<dyn LoadEffect>>,
}

impl ExplicitFile {
    /// Path relative to the folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resources the file provides. Empty means "infer from the file name".
    pub fn provides(&self) -> &OrderedRegistry<QualifiedName> {
        &self.provides
    }
}

impl fmt::Debug for ExplicitFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplicitFile")
            .field("path", &self.path)
            .field("provides", &self.provides)
            .field("custom_effect", &self.effect.is_some())
            .finish()
    }
}

// ============================================================================
// HANDLES
// ============================================================================

/// Declaration handle for a component.
///
/// Every method fails with [`ProtectionError::Frozen`] once the component
/// graph has been finalized.
pub struct ComponentHandle<'a> {
    component: &'a mut Component,
}

impl<'a> ComponentHandle<'a> {
    pub(crate) fn new(component: &'a mut Component) -> Self {
        Self { component }
    }

    pub fn id(&self) -> &str {
        &self.component.id
    }

    /// Declare dependencies on other components by id.
    pub fn depends_on<I, S>(&mut self, ids: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.component.protect_from_modification()?;
        for id in ids {
            let id = id.as_ref();
            validate_component_id(id).map_err(|reason| ConfigError::InvalidName {
                name: id.to_string(),
                reason,
            })?;
            self.component.dependency_ids.insert(SmolStr::new(id));
        }
        Ok(self)
    }

    /// Set the namespace token. The token may itself be qualified (`A::B`).
    pub fn namespace(&mut self, token: &str) -> Result<&mut Self> {
        self.component.protect_from_modification()?;
        let name = QualifiedName::from_token(token).map_err(|reason| ConfigError::InvalidName {
            name: token.to_string(),
            reason,
        })?;
        self.component.namespace_token = (!name.is_root()).then_some(name);
        Ok(self)
    }

    /// Define the namespace with a file (relative to the component base)
    /// instead of binding it empty.
    pub fn namespace_file(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self> {
        self.set_namespace_file(path.into(), None)
    }

    /// [`namespace_file`](Self::namespace_file) loaded by a custom effect.
    pub fn namespace_file_with_effect(
        &mut self,
        path: impl Into<PathBuf>,
        effect: impl LoadEffect + 'static,
    ) -> Result<&mut Self> {
        self.set_namespace_file(path.into(), Some(Arc::new(effect)))
    }

    fn set_namespace_file(&mut self, path: PathBuf, effect: Option<Arc<dyn LoadEffect>>) -> Result<&mut Self> {
        self.component.protect_from_modification()?;
        self.component.namespace_file = Some(ExplicitFile {
            path,
            provides: OrderedRegistry::new(),
            effect,
        });
        Ok(self)
    }

    /// Register a folder. Declaring the same path twice replaces its options
    /// and keeps the files already registered on it.
    pub fn folder(
        &mut self,
        path: impl Into<PathBuf>,
        options: FolderOptions,
    ) -> Result<FolderHandle<'_>> {
        self.component.protect_from_modification()?;
        let path = path.into();
        let index = match self.component.folders.iter().position(|f| f.path == path) {
            Some(index) => {
                self.component.folders[index].options = options;
                index
            }
            None => {
                self.component.folders.push(FolderDecl {
                    path,
                    options,
                    files: Vec::new(),
                });
                self.component.folders.len() - 1
            }
        };
        Ok(FolderHandle {
            component: &self.component.id,
            frozen: self.component.frozen,
            folder: &mut self.component.folders[index],
        })
    }
}

/// Declaration handle for a folder, used to register files explicitly.
pub struct FolderHandle<'a> {
    component: &'a SmolStr,
    frozen: bool,
    folder: &'a mut FolderDecl,
}

impl FolderHandle<'_> {
    /// Register a file with the resources it provides.
    ///
    /// An empty `provides` list falls back to the name inferred from the path.
    pub fn file<I, S>(&mut self, relative_path: impl Into<PathBuf>, provides: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(relative_path.into(), provides, None)
    }

    /// Register a file loaded by a custom effect instead of the loader default.
    pub fn file_with_effect<I, S>(
        &mut self,
        relative_path: impl Into<PathBuf>,
        provides: I,
        effect: impl LoadEffect + 'static,
    ) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(relative_path.into(), provides, Some(Arc::new(effect)))
    }

    fn register<I, S>(
        &mut self,
        path: PathBuf,
        provides: I,
        effect: Option<Arc<dyn LoadEffect>>,
    ) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.frozen {
            return Err(ProtectionError::Frozen {
                id: self.component.clone(),
            }
            .into());
        }
        let provides = provides
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                QualifiedName::parse(name).map_err(|reason| ConfigError::InvalidName {
                    name: name.to_string(),
                    reason,
                })
            })
            .collect::<Result<OrderedRegistry<_>, _>>()?;
        self.folder.files.retain(|file| file.path != path);
        self.folder.files.push(ExplicitFile {
            path,
            provides,
            effect,
        });
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;

    #[test]
    fn test_handle_records_declarations() {
        let mut component = Component::new("framework", "/app");
        let mut handle = ComponentHandle::new(&mut component);

        handle.depends_on(["core", "core"]).unwrap().namespace("Framework").unwrap();
        handle
            .folder("lib", FolderOptions::default())
            .unwrap()
            .file("klass.def", ["Klass", "Klass::Helper"])
            .unwrap();

        assert_eq!(component.dependency_ids().collect::<Vec<_>>(), vec!["core"]);
        assert_eq!(component.namespace_token().unwrap().as_str(), "Framework");
        assert_eq!(component.folders().len(), 1);
        assert_eq!(component.folders()[0].files()[0].provides().len(), 2);
    }

    #[test]
    fn test_same_folder_declared_twice() {
        let mut component = Component::new("framework", "/app");
        let mut handle = ComponentHandle::new(&mut component);

        handle.folder("lib", FolderOptions::default()).unwrap().file("a.def", ["A"]).unwrap();
        handle.folder("lib", FolderOptions::default().with_preload(true)).unwrap();

        assert_eq!(component.folders().len(), 1);
        assert!(component.folders()[0].options().preload);
        assert_eq!(component.folders()[0].files().len(), 1);
    }

    #[test]
    fn test_frozen_component_rejects_changes() {
        let mut component = Component::new("framework", "/app");
        component.frozen = true;
        let mut handle = ComponentHandle::new(&mut component);

        let err = handle.depends_on(["core"]).err().unwrap();
        assert!(matches!(err, LoaderError::Protection(ProtectionError::Frozen { .. })));
        assert!(handle.namespace("Other").is_err());
        assert!(handle.folder("lib", FolderOptions::default()).is_err());
        assert!(handle.namespace_file("framework.def").is_err());
        assert_eq!(component.namespace_file(), None);
    }

    #[test]
    fn test_namespace_file_recorded() {
        let mut component = Component::new("framework", "/app");
        ComponentHandle::new(&mut component)
            .namespace("Framework")
            .unwrap()
            .namespace_file("lib/framework.def")
            .unwrap();

        assert_eq!(component.namespace_file(), Some(Path::new("lib/framework.def")));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut component = Component::new("framework", "/app");
        let mut handle = ComponentHandle::new(&mut component);

        assert!(matches!(
            handle.depends_on(["bad id"]).err().unwrap(),
            LoaderError::Config(ConfigError::InvalidName { .. })
        ));
        assert!(
            handle
                .folder("lib", FolderOptions::default())
                .unwrap()
                .file("x.def", ["Not::9Valid"])
                .is_err()
        );
    }
}
