//! Loader and folder configuration.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Options for a folder registered by a component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FolderOptions {
    /// Sub-folders introduce a namespace: `plugins/klass.def` provides
    /// `Plugins::Klass` instead of `Klass`.
    pub nested_namespaces: bool,
    /// Scan the folder and infer resources from file names. When false only
    /// files registered with [`FolderHandle::file`](crate::FolderHandle::file)
    /// are tracked.
    pub automatic_scan: bool,
    /// Load every resource of the folder at startup.
    pub preload: bool,
    /// Rescan and reload this folder on [`Loader::update`](crate::Loader::update).
    pub reloadable: bool,
    /// Namespace used instead of the component's.
    pub namespace_override: Option<String>,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            nested_namespaces: true,
            automatic_scan: true,
            preload: false,
            reloadable: true,
            namespace_override: None,
        }
    }
}

impl FolderOptions {
    /// Options for a folder whose files are all registered explicitly.
    pub fn explicit() -> Self {
        Self {
            automatic_scan: false,
            ..Self::default()
        }
    }

    pub fn with_nested_namespaces(mut self, nested: bool) -> Self {
        self.nested_namespaces = nested;
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace_override = Some(namespace.into());
        self
    }
}

/// Settings shared by every folder of a loader.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoaderConfig {
    /// Base directory that relative folder paths are joined onto.
    pub base: PathBuf,
    /// File extensions (without the dot) recognised as source files.
    pub extensions: Vec<String>,
    /// Extensions of files that run again when reloaded. Files with any other
    /// extension only run the first time they load. `None` makes every file
    /// reloadable.
    pub reloadable_extensions: Option<Vec<String>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::from("."),
            extensions: vec!["def".to_string()],
            reloadable_extensions: None,
        }
    }
}

impl LoaderConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    /// Replace the recognised source extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Only run files with one of `extensions` again on reload.
    pub fn with_reloadable_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reloadable_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// True if `path` has one of the recognised extensions.
    pub fn is_source_file(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }

    /// Read settings from JSON. Missing keys keep their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, crate::error::ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
