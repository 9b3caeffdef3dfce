//! # lazytree
//!
//! A dependency-aware, lazy-binding resource loader.
//!
//! Components declare folders, dependencies and a namespace. Files in those
//! folders provide namespaced resources; a resource is bound the first time
//! something asks for it, together with every file related to it.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! project   → Loader context, folders, naming, shared loader
//!   ↓
//! resource  → Resource tree, tracked files, bindings, load/unload
//!   ↓
//! component → Component declarations and the frozen component graph
//!   ↓
//! base      → Primitives (ids, qualified names, ordered sets)
//! ```

// ============================================================================
// FOUNDATION
// ============================================================================

/// Foundation types: arena ids, qualified names, ordered sets
pub mod base;

/// Loader and folder settings
pub mod config;

/// Error families and the crate `Result`
pub mod error;

// ============================================================================
// LOADER
// ============================================================================

/// Component declarations and the component graph
pub mod component;

/// Resources, files and bindings
pub mod resource;

/// The loader context
pub mod project;

pub use base::{ComponentId, FileId, FolderId, OrderedRegistry, QualifiedName, ResourceId};
pub use component::{ComponentGraph, ComponentGraphBuilder, ComponentHandle, FolderHandle};
pub use config::{FolderOptions, LoaderConfig};
pub use error::{ConfigError, LoadError, LoaderError, ProtectionError, ResolutionError, Result};
pub use project::{CamelCaseNaming, Loader, Naming, Resolution, SharedLoader, UpdateReport};
pub use resource::{Binding, Bindings, DefinitionReader, LoadContext, LoadEffect};
