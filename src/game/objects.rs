//! Object Table
//!
//! Owns every live object, keyed by id, with a secondary index by config id.
//! Mutable access through [`ObjectManager::get_mut`] stamps the object's
//! `last_change` with the current tick so delta snapshots pick it up.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::core::ids::{ObjectId, Tick};
use crate::game::object::{GameObject, ObjectSnapshot};

/// Table of live objects.
#[derive(Debug, Default)]
pub struct ObjectManager {
    objects: BTreeMap<ObjectId, GameObject>,
    by_config_id: BTreeMap<String, BTreeSet<ObjectId>>,
    tick: Tick,
}

impl ObjectManager {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick used to stamp changes.
    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Current stamping tick.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Insert an object, marking it changed. Replaces an object with the same id.
    pub fn add(&mut self, mut obj: GameObject) {
        obj.mark_changed(self.tick);
        self.insert(obj);
    }

    /// Insert without touching `last_change` (snapshot loading).
    pub fn insert(&mut self, obj: GameObject) {
        if let Some(previous) = self.objects.get(&obj.id) {
            let previous_config = previous.config_id.clone();
            self.unindex(obj.id, previous_config.as_deref());
        }
        if let Some(config_id) = &obj.config_id {
            self.by_config_id.entry(config_id.clone()).or_default().insert(obj.id);
        }
        self.objects.insert(obj.id, obj);
    }

    /// Object by id.
    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    /// Mutable object by id; stamps `last_change`.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        let tick = self.tick;
        self.objects.get_mut(&id).map(|obj| {
            obj.mark_changed(tick);
            obj
        })
    }

    /// Remove an object. Removing a missing id returns `None`.
    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        let obj = self.objects.remove(&id)?;
        self.unindex(id, obj.config_id.as_deref());
        Some(obj)
    }

    /// Temporarily detach an object so it can be borrowed alongside another.
    /// Must be paired with [`ObjectManager::restore`].
    pub(crate) fn take(&mut self, id: ObjectId) -> Option<GameObject> {
        self.objects.remove(&id)
    }

    /// Put back an object detached with [`ObjectManager::take`].
    pub(crate) fn restore(&mut self, obj: GameObject) {
        self.objects.insert(obj.id, obj);
    }

    /// True when `id` is live.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    /// Ids in order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Objects built from `config_id`.
    pub fn by_config_id(&self, config_id: &str) -> Vec<&GameObject> {
        self.by_config_id
            .get(config_id)
            .map(|ids| ids.iter().filter_map(|id| self.objects.get(id)).collect())
            .unwrap_or_default()
    }

    /// Drop every object.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.by_config_id.clear();
    }

    /// Snapshots of objects changed at or after `cutoff`.
    ///
    /// Objects that fail to serialize are logged and skipped.
    pub fn snapshot_since(&self, cutoff: Tick) -> Vec<ObjectSnapshot> {
        self.objects
            .values()
            .filter(|obj| obj.last_change >= cutoff)
            .filter_map(|obj| match obj.snapshot() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(object_id = %obj.id, error = %e, "Skipping unserializable object");
                    None
                }
            })
            .collect()
    }

    /// Snapshots of every object.
    pub fn snapshot_full(&self) -> Vec<ObjectSnapshot> {
        self.snapshot_since(0)
    }

    fn unindex(&mut self, id: ObjectId, config_id: Option<&str>) {
        let Some(config_id) = config_id else { return };
        if let Some(ids) = self.by_config_id.get_mut(config_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_config_id.remove(config_id);
            }
        }
    }
}
