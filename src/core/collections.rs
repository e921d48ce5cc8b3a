//! Collection aliases used throughout the mesh data structures.
//!
//! Hash maps use `rustc-hash` (Fx) hashing, which is much faster than SipHash
//! for the small integer keys the mesh produces. Short per-entity lists use
//! `SmallVec` so the common case never touches the heap.

use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::core::cell::CellKey;
use crate::core::vertex::VertexKey;

/// Generation-checked arena backing vertex and cell storage.
///
/// Removed slots are recycled by later insertions; stale keys fail lookup
/// instead of aliasing the new occupant.
pub type StorageMap<K, V> = SlotMap<K, V>;

/// Optimized `HashMap` type for performance-critical operations.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Optimized `HashSet` type for performance-critical operations.
pub type FastHashSet<T> = FxHashSet<T>;

/// Stack-allocated buffer that spills to the heap past `N` elements.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Cell keys around a vertex or an edge.
pub type CellKeyBuffer = SmallBuffer<CellKey, 16>;

/// Vertex keys of a vertex star.
pub type VertexKeyBuffer = SmallBuffer<VertexKey, 16>;

/// Creates a [`FastHashMap`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Creates a [`FastHashSet`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
}
