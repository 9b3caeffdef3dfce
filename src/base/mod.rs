//! Foundation types for the loader.
//!
//! This module provides fundamental types used throughout the crate:
//! - [`ComponentId`], [`FolderId`], [`FileId`], [`ResourceId`] - Arena handles
//! - [`QualifiedName`] - `::`-separated resource names
//! - [`OrderedRegistry`] - Insertion-ordered sets
//!
//! This module has NO dependencies on other lazytree modules.

mod ids;
mod name;
mod ordered;

pub use ids::{ComponentId, FileId, FolderId, ResourceId};
pub use name::{
    COMPONENT_SEPARATOR, NAMESPACE_SEPARATOR, NameError, QualifiedName, component_ancestors,
    parent_component_id, validate_component_id,
};
pub use ordered::OrderedRegistry;
