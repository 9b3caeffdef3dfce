//! A loader shared between threads.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::loader::{Loader, Resolution, UpdateReport};
use crate::error::Result;
use crate::resource::Binding;

/// Thread-safe handle to a [`Loader`].
///
/// Anything that may bind, release or rescan takes the write lock, so loads
/// never interleave. Read-only lookups share the read lock.
#[derive(Clone, Debug)]
pub struct SharedLoader {
    inner: Arc<RwLock<Loader>>,
}

impl SharedLoader {
    pub fn new(loader: Loader) -> Self {
        Self {
            inner: Arc::new(RwLock::new(loader)),
        }
    }

    /// Lock for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Loader> {
        self.inner.read()
    }

    /// Lock for writing, e.g. to declare components before startup.
    pub fn write(&self) -> RwLockWriteGuard<'_, Loader> {
        self.inner.write()
    }

    pub fn start(&self) -> Result<()> {
        self.inner.write().start()
    }

    /// Resolve a name. Fast path: an already bound name only needs the read
    /// lock.
    pub fn resolve(&self, name: &str) -> Result<Arc<Binding>> {
        if let Some(binding) = self.inner.read().binding(name) {
            return Ok(binding);
        }
        self.inner.write().resolve(name)
    }

    pub fn on_unresolved_name(&self, scope: &str, name: &str) -> Result<Resolution> {
        self.inner.write().on_unresolved_name(scope, name)
    }

    pub fn binding(&self, name: &str) -> Option<Arc<Binding>> {
        self.inner.read().binding(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.inner.read().is_bound(name)
    }

    pub fn update(&self) -> Result<UpdateReport> {
        self.inner.write().update()
    }

    pub fn reset(&self) {
        self.inner.write().reset();
    }
}

impl From<Loader> for SharedLoader {
    fn from(loader: Loader) -> Self {
        Self::new(loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::resource::Bindings;

    #[test]
    fn test_shared_loader_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedLoader>();
    }

    #[test]
    fn test_resolve_pre_existing_through_read_lock() {
        let bindings = Bindings::with_globals(["String"]).unwrap();
        let shared = SharedLoader::new(Loader::with_bindings(LoaderConfig::default(), bindings));
        shared.start().unwrap();

        let clone = shared.clone();
        let handle = std::thread::spawn(move || clone.resolve("String").is_ok());
        assert!(handle.join().unwrap());
        assert!(shared.is_bound("String"));
    }
}
