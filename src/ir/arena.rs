//! Arena storage for IR nodes.
//!
//! Nodes are referenced by typed indices instead of pointers:
//! - **O(1) allocation**: bump into a Vec, nothing is ever freed piecemeal
//! - **No dangling edges**: an `Id` stays valid for the life of the arena,
//!   so rewiring a memory-chain link can never leave a stale pointer
//! - **Cheap side tables**: `SecondaryMap` attaches pass-local data without
//!   touching the node layout

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// A type-safe index into an arena.
///
/// The phantom parameter keeps IDs from different arenas from mixing.
/// Traits are implemented manually so `Id<T>` is `Copy`/`Eq`/`Hash` whether
/// or not `T` is.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Id<T> {
    /// Create an ID from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Raw index as `usize`.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only arena of homogeneous items addressed by `Id`.
///
/// Individual items are never deallocated; dead nodes are flagged, not
/// removed, and the whole arena is dropped with its graph.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[inline]
    pub fn new() -> Self {
        Arena { items: Vec::new() }
    }

    /// Create an arena with room for `capacity` items.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Allocate an item, returning its ID.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let index = self.items.len() as u32;
        self.items.push(item);
        Id::new(index)
    }

    /// Look up an item by ID.
    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.as_usize())
    }

    /// Look up an item mutably by ID.
    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.items.get_mut(id.as_usize())
    }

    /// Number of items ever allocated (dead ones included).
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if `id` names an allocated slot.
    #[inline]
    pub fn contains(&self, id: Id<T>) -> bool {
        id.as_usize() < self.items.len()
    }

    /// Iterate over all items with their IDs, in allocation order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Id::new(i as u32), item))
    }

    /// Iterate over all IDs in allocation order.
    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = Id<T>> {
        (0..self.items.len() as u32).map(Id::new)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        &self.items[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        &mut self.items[id.as_usize()]
    }
}

// =============================================================================
// Secondary Map
// =============================================================================

/// Side table keyed by arena IDs.
///
/// Holds per-node data that doesn't belong in the node itself (the reverse
/// usage index, pass-local marks). Grows on demand; absent keys read as
/// `V::default()`.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V> {
    values: Vec<V>,
    _marker: PhantomData<K>,
}

impl<K, V: Default + Clone> SecondaryMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        SecondaryMap {
            values: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Get the value for an ID, if one was ever set.
    pub fn get(&self, id: Id<K>) -> Option<&V> {
        self.values.get(id.as_usize())
    }

    /// Get the value for an ID mutably, growing the table if needed.
    pub fn entry(&mut self, id: Id<K>) -> &mut V {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, V::default());
        }
        &mut self.values[idx]
    }

    /// Set the value for an ID, growing the table if needed.
    pub fn set(&mut self, id: Id<K>, value: V) {
        *self.entry(id) = value;
    }

    /// Iterate over all populated slots.
    pub fn iter(&self) -> impl Iterator<Item = (Id<K>, &V)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (Id::new(i as u32), v))
    }
}

impl<K, V: Default + Clone> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Bit Set
// =============================================================================

/// Compact bit set over arena indices, used for visited marks during
/// chain-cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitSet {
    bits: Vec<u64>,
}

impl BitSet {
    /// Create an empty bit set.
    pub fn new() -> Self {
        BitSet { bits: Vec::new() }
    }

    /// Create a bit set sized for `n` bits.
    pub fn with_capacity(n: usize) -> Self {
        BitSet {
            bits: vec![0; n.div_ceil(64)],
        }
    }

    /// Set a bit, returning whether it was previously clear.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let word = index / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let mask = 1u64 << (index % 64);
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    /// Check a bit.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.bits
            .get(index / 64)
            .is_some_and(|w| w & (1u64 << (index % 64)) != 0)
    }

    /// Clear every bit, keeping capacity.
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        value: i32,
    }

    #[test]
    fn test_arena_alloc_and_index() {
        let mut arena: Arena<Item> = Arena::new();

        let a = arena.alloc(Item { value: 10 });
        let b = arena.alloc(Item { value: 20 });

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena[a].value, 10);
        assert_eq!(arena[b].value, 20);

        arena[b].value = 200;
        assert_eq!(arena[b].value, 200);
        assert!(arena.contains(b));
        assert!(!arena.contains(Id::new(2)));
    }

    #[test]
    fn test_arena_iter_order() {
        let mut arena: Arena<Item> = Arena::new();
        arena.alloc(Item { value: 1 });
        arena.alloc(Item { value: 2 });
        arena.alloc(Item { value: 3 });

        let values: Vec<_> = arena.iter().map(|(_, n)| n.value).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_secondary_map_defaults() {
        let mut arena: Arena<Item> = Arena::new();
        let a = arena.alloc(Item { value: 1 });
        let b = arena.alloc(Item { value: 2 });

        let mut map: SecondaryMap<Item, u32> = SecondaryMap::new();
        map.set(b, 7);

        assert_eq!(map.get(a).copied(), Some(0));
        assert_eq!(map.get(b).copied(), Some(7));
        *map.entry(a) += 1;
        assert_eq!(map.get(a).copied(), Some(1));
    }

    #[test]
    fn test_bit_set_insert_reports_fresh() {
        let mut set = BitSet::new();
        assert!(set.insert(5));
        assert!(!set.insert(5));
        assert!(set.insert(64));
        assert!(set.contains(5));
        assert!(set.contains(64));
        assert!(!set.contains(6));
        assert_eq!(set.count(), 2);

        set.clear();
        assert_eq!(set.count(), 0);
    }
}
