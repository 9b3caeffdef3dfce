//! Resources: lazily bound, namespaced names backed by source files.
//!
//! - [`ResourceTree`] tracks names and which files provide them
//! - [`FileRegistry`] tracks files and their relation closures
//! - [`Bindings`] holds what is currently bound
//! - [`Registry`] loads, unloads and reloads over all three

mod binding;
mod files;
mod registry;
mod tree;

pub use binding::{Binding, Bindings, DefinitionReader, LoadContext, LoadEffect};
pub use files::{Closure, FileRegistry, SourceFile};
pub use registry::Registry;
pub use tree::{Resource, ResourceTree};
