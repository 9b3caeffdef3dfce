//! Insertion-ordered sets with O(1) membership.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

/// An insertion-ordered set.
///
/// Iteration follows insertion order; membership checks are hashed. Removal
/// shifts later entries down so the remaining order is preserved.
#[derive(Clone, PartialEq, Eq)]
pub struct OrderedRegistry<T: Hash + Eq> {
    items: IndexSet<T, FxBuildHasher>,
}

impl<T: Hash + Eq> OrderedRegistry<T> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            items: IndexSet::with_hasher(FxBuildHasher),
        }
    }

    /// Add an item. Returns `false` if it was already present (order unchanged).
    pub fn insert(&mut self, item: T) -> bool {
        self.items.insert(item)
    }

    /// Remove an item, preserving the order of the others.
    pub fn remove(&mut self, item: &T) -> bool {
        self.items.shift_remove(item)
    }

    /// Check if an item is present.
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// The first item inserted that is still present.
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    /// Get the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Hash + Eq + Clone> OrderedRegistry<T> {
    /// Copy the items out, in order.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Hash + Eq> Default for OrderedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> Extend<T> for OrderedRegistry<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T: Hash + Eq> FromIterator<T> for OrderedRegistry<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut registry = Self::new();
        registry.extend(iter);
        registry
    }
}

impl<'a, T: Hash + Eq> IntoIterator for &'a OrderedRegistry<T> {
    type Item = &'a T;
    type IntoIter = indexmap::set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Hash + Eq + fmt::Debug> fmt::Debug for OrderedRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}
