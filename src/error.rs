//! Error types for the loader.
//!
//! Four families, matching how failures are handled by callers:
//! configuration problems abort startup, resolution misses let the caller fall
//! back, load failures propagate to whoever asked for the binding, and
//! protection errors are programmer mistakes.

use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::base::{NameError, QualifiedName};

/// Result type alias for loader operations.
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

/// Any error raised by the loader.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Protection(#[from] ProtectionError),
}

impl LoaderError {
    /// True if the error only means "this name is not tracked".
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::Resolution(ResolutionError::NotFound { .. }))
    }
}

/// Invalid component declarations or folder setup. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("a component named '{id}' already exists")]
    DuplicateComponent { id: SmolStr },

    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnresolvedDependency {
        component: SmolStr,
        dependency: SmolStr,
    },

    #[error("circular reference detected in component dependency graph ({component}): {}", .cycle.join(" -> "))]
    CircularDependency {
        component: SmolStr,
        cycle: Vec<SmolStr>,
    },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: NameError },

    #[error("folder not found: {path}")]
    MissingFolder { path: PathBuf },

    #[error("failed to scan folder {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[cfg(feature = "serde")]
    #[error("invalid loader settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// A lookup for a name nobody tracks.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("resource '{name}' is not tracked by any component")]
    NotFound { name: QualifiedName },

    #[error("invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: NameError },

    #[error("no component named '{id}'")]
    UnknownComponent { id: SmolStr },
}

/// A backing file could not be read or did not produce its bindings.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path} defines '{name}' which it does not provide")]
    Undeclared { path: PathBuf, name: QualifiedName },

    #[error("cannot bind '{name}': its parent is not bound")]
    UnboundParent { name: QualifiedName },

    #[error("loading {path} requires itself to be loaded first")]
    CircularLoad { path: PathBuf },

    #[error("'{name}' was not defined by any of its files")]
    NotDefined { name: QualifiedName },

    #[error("failed to load {path}: {message}")]
    Failed { path: PathBuf, message: String },
}

/// Mutation attempted after declarations were frozen.
#[derive(Error, Debug)]
pub enum ProtectionError {
    #[error("modification of component '{id}' after it has been frozen")]
    Frozen { id: SmolStr },

    #[error("components cannot be declared after the loader has started")]
    Started,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_circular_dependency() {
        let err = ConfigError::CircularDependency {
            component: SmolStr::new("x"),
            cycle: vec![SmolStr::new("x"), SmolStr::new("y"), SmolStr::new("x")],
        };
        assert_eq!(
            err.to_string(),
            "circular reference detected in component dependency graph (x): x -> y -> x"
        );
    }

    #[test]
    fn test_error_display_parse() {
        let err = LoadError::Parse {
            path: PathBuf::from("lib/klass.def"),
            line: 3,
            message: "unterminated section header".to_string(),
        };
        assert_eq!(err.to_string(), "lib/klass.def:3: unterminated section header");
    }

    #[test]
    fn test_not_found_is_transparent() {
        let err: LoaderError = ResolutionError::NotFound {
            name: QualifiedName::parse("Missing").unwrap(),
        }
        .into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "resource 'Missing' is not tracked by any component");
    }
}
