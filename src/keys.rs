//! Handle types for the objects stored in a [`World`][crate::World].
//!
//! Every handle wraps a [`thunderdome::Index`], a slot plus a generation.
//! Slots are small dense integers that get reused after removal,
//! which makes them suitable for indexing bitsets and building pair keys.
//! Generations make stale handles detectable.

use thunderdome as td;

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) td::Index);

        impl $name {
            /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
            /// Useful for creating your own mappings from these to other things.
            #[inline]
            pub fn index(&self) -> td::Index {
                self.0
            }

            /// The arena slot of this key. Unique among live objects of the same kind.
            #[inline]
            pub fn slot(&self) -> u32 {
                self.0.slot()
            }
        }
    };
}

arena_key!(
    /// Key type to look up a body stored in the world.
    BodyKey
);
arena_key!(
    /// Key type to look up a shape stored in the world.
    ShapeKey
);
arena_key!(
    /// Key type to look up a contact between two shapes.
    ContactKey
);
arena_key!(
    /// Key type to look up a joint between two bodies.
    JointKey
);
arena_key!(
    /// Key type to look up an island of connected bodies.
    IslandKey
);

/// Index of a solver set, the storage partition a simulation record currently lives in.
///
/// The first three sets always exist. Every other set holds one or more sleeping islands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetIndex(pub(crate) u32);

impl SetIndex {
    pub const STATIC: SetIndex = SetIndex(0);
    pub const DISABLED: SetIndex = SetIndex(1);
    pub const AWAKE: SetIndex = SetIndex(2);
    pub const FIRST_SLEEPING: SetIndex = SetIndex(3);

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        *self >= Self::FIRST_SLEEPING
    }

    #[inline]
    pub fn slot(&self) -> u32 {
        self.0
    }
}

/// One end of a contact or joint in a body's intrusive edge list.
///
/// `edge` is 0 if the body is the first body of the constraint and 1 otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EdgeKey<K> {
    pub key: K,
    pub edge: usize,
}

impl<K> EdgeKey<K> {
    #[inline]
    pub fn new(key: K, edge: usize) -> Self {
        debug_assert!(edge < 2);
        Self { key, edge }
    }
}

/// Links of one body in a contact's or joint's pair of edge lists.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Edge<K> {
    pub body: BodyKey,
    pub prev: Option<EdgeKey<K>>,
    pub next: Option<EdgeKey<K>>,
}

impl<K> Edge<K> {
    #[inline]
    pub fn new(body: BodyKey) -> Self {
        Self {
            body,
            prev: None,
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeping_sets_start_after_awake() {
        assert!(!SetIndex::STATIC.is_sleeping());
        assert!(!SetIndex::DISABLED.is_sleeping());
        assert!(!SetIndex::AWAKE.is_sleeping());
        assert!(SetIndex::FIRST_SLEEPING.is_sleeping());
        assert!(SetIndex(7).is_sleeping());
    }

    #[test]
    fn slots_are_reused_with_new_generation() {
        let mut arena = td::Arena::new();
        let first = BodyKey(arena.insert(()));
        arena.remove(first.0);
        let second = BodyKey(arena.insert(()));
        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);
    }
}
