//! The loader context and the folders it tracks.
//!
//! - [`Loader`] - declarations, startup, resolution, `update` and `reset`
//! - [`Folder`] - explicit and automatic file sets
//! - [`Naming`] - file path to resource name
//! - [`SharedLoader`] - the loader behind a read-write lock

mod folder;
mod loader;
mod naming;
mod shared;

pub use folder::{Folder, ScanDiff, ScanMode, list_source_files};
pub use loader::{Loader, Resolution, UpdateReport};
pub use naming::{CamelCaseNaming, Naming, camelize};
pub use shared::SharedLoader;
