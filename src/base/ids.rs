//! Arena identifiers for components, folders, files and resources.
//!
//! Each id is a lightweight handle (just a u32) into the arena that owns the
//! entity. Ids are never reused within a session, so a stale id simply fails
//! to resolve instead of aliasing a newer entity.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub u32);

        impl $name {
            /// Create a new id from a raw index.
            #[inline]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Get the raw index.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(id: u32) -> Self {
                Self(id)
            }
        }
    };
}

arena_id!(
    /// A component in the component graph.
    ComponentId,
    "component"
);

arena_id!(
    /// A folder registered by a component.
    FolderId,
    "folder"
);

arena_id!(
    /// A tracked source file.
    FileId,
    "file"
);

arena_id!(
    /// A node of the resource tree.
    ResourceId,
    "resource"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_equality() {
        let a = FileId::new(1);
        let b = FileId::new(1);
        let c = FileId::new(2);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(ResourceId::new(1));
        set.insert(ResourceId::new(2));
        set.insert(ResourceId::new(1)); // duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(FileId::new(3).to_string(), "file#3");
        assert_eq!(format!("{:?}", ComponentId::new(7)), "ComponentId(7)");
    }

    #[test]
    fn test_id_size() {
        assert_eq!(std::mem::size_of::<FileId>(), 4);
        assert_eq!(std::mem::size_of::<ResourceId>(), 4);
    }
}
