//! Components: named units of code with dependencies and a namespace.
//!
//! Declarations go through [`ComponentGraphBuilder`]; finalizing it yields a
//! frozen [`ComponentGraph`].

mod builder;
mod model;

pub use builder::{ComponentGraph, ComponentGraphBuilder};
pub use model::{Component, ComponentHandle, ExplicitFile, FolderDecl, FolderHandle};
