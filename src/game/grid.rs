//! Grid Spatial Index
//!
//! Maps integer grid cells to the objects occupying them, with a reverse
//! index from object to cell. Both directions are hash lookups so
//! `objects_at` is O(1). Buckets keep insertion order so iteration over a
//! cell is deterministic.

use std::collections::HashMap;
use std::fmt;
use serde::{Serialize, Deserialize, Serializer, Deserializer};

use crate::core::ids::ObjectId;
use crate::core::tagged;

/// Integer grid cell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Coord {
    /// Column
    pub x: i64,
    /// Row
    pub y: i64,
}

impl Coord {
    /// Create a cell coordinate.
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Debug for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coord({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for Coord {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        tagged::tuple::serialize(&(self.x, self.y), serializer)
    }
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y): (i64, i64) = tagged::tuple::deserialize(deserializer)?;
        Ok(Coord { x, y })
    }
}

/// Bidirectional cell index.
///
/// Invariant: an id is in at most one bucket, and `obj_to_coord[id] == c`
/// exactly when `id` is in bucket `c`. Empty buckets are never kept.
#[derive(Debug, Default)]
pub struct GridSpace {
    coord_to_objs: HashMap<Coord, Vec<ObjectId>>,
    obj_to_coord: HashMap<ObjectId, Coord>,
}

impl GridSpace {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `id` at `coord`, evicting it from its previous cell.
    pub fn move_to(&mut self, coord: Coord, id: ObjectId) {
        if let Some(previous) = self.obj_to_coord.get(&id).copied() {
            if previous == coord {
                return;
            }
            self.detach(previous, id);
        }
        self.coord_to_objs.entry(coord).or_default().push(id);
        self.obj_to_coord.insert(id, coord);
    }

    /// Ids at `coord` (empty when the cell is unoccupied).
    #[inline]
    pub fn objects_at(&self, coord: Coord) -> &[ObjectId] {
        self.coord_to_objs.get(&coord).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove `id` entirely. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ObjectId) {
        if let Some(coord) = self.obj_to_coord.remove(&id) {
            self.detach(coord, id);
        }
    }

    /// Cell currently holding `id`.
    #[inline]
    pub fn coord_of(&self, id: ObjectId) -> Option<Coord> {
        self.obj_to_coord.get(&id).copied()
    }

    /// True when `id` is indexed.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.obj_to_coord.contains_key(&id)
    }

    /// Number of indexed ids.
    pub fn len(&self) -> usize {
        self.obj_to_coord.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.obj_to_coord.is_empty()
    }

    /// Number of occupied cells.
    pub fn occupied_cells(&self) -> usize {
        self.coord_to_objs.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.coord_to_objs.clear();
        self.obj_to_coord.clear();
    }

    fn detach(&mut self, coord: Coord, id: ObjectId) {
        if let Some(bucket) = self.coord_to_objs.get_mut(&coord) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.coord_to_objs.remove(&coord);
            }
        }
    }

    /// Check forward/reverse agreement (test helper).
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward_total: usize = self.coord_to_objs.values().map(Vec::len).sum();
        forward_total == self.obj_to_coord.len()
            && self.coord_to_objs.values().all(|bucket| !bucket.is_empty())
            && self.coord_to_objs.iter().all(|(coord, bucket)| {
                bucket.iter().all(|id| self.obj_to_coord.get(id) == Some(coord))
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
