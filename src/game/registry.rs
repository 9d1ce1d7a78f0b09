//! Object Type Registry
//!
//! Maps snapshot type tags to constructors so a serialized object can be
//! rebuilt as the right kind. Constructors install type-specific defaults
//! (shapes, triggers); the snapshot payload then overwrites the state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::ids::ObjectId;
use crate::game::object::{GameObject, ObjectSnapshot};
use crate::game::snapshot::SnapshotError;

/// Builds a fresh object of one registered type.
pub type ObjectCtor = Arc<dyn Fn(ObjectId) -> GameObject + Send + Sync>;

/// Type name of the plain object kind, registered by default.
pub const BASE_OBJECT_TYPE: &str = "GObject";

/// Type name to constructor table.
#[derive(Clone)]
pub struct ObjectRegistry {
    ctors: BTreeMap<String, ObjectCtor>,
}

impl ObjectRegistry {
    /// Registry knowing only the base object type.
    pub fn new() -> Self {
        let mut registry = Self { ctors: BTreeMap::new() };
        registry.register(BASE_OBJECT_TYPE, Arc::new(|id| GameObject::new(id, BASE_OBJECT_TYPE)));
        registry
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, type_name: impl Into<String>, ctor: ObjectCtor) {
        self.ctors.insert(type_name.into(), ctor);
    }

    /// True when `type_name` is known.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.ctors.contains_key(type_name)
    }

    /// Build a fresh object. The type name is always set to `type_name`.
    pub fn create(&self, type_name: &str, id: ObjectId) -> Result<GameObject, SnapshotError> {
        let ctor = self
            .ctors
            .get(type_name)
            .ok_or_else(|| SnapshotError::UnknownType(type_name.to_string()))?;
        let mut obj = ctor(id);
        obj.type_name = type_name.to_string();
        Ok(obj)
    }

    /// Rebuild an object from its snapshot.
    pub fn create_from_snapshot(&self, snapshot: &ObjectSnapshot) -> Result<GameObject, SnapshotError> {
        let id = snapshot.object_id().ok_or(SnapshotError::MissingId)?;
        let mut obj = self.create(&snapshot.type_name, id)?;
        obj.load_snapshot(snapshot)?;
        Ok(obj)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.ctors.keys()).finish()
    }
}
