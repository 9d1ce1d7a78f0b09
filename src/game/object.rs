//! Game Objects
//!
//! Entities of the simulation. An object with no position is not in the
//! world and is never present in the spatial index. Lifecycle:
//!
//! ```text
//! created (detached, disabled) -> spawned (positioned, enabled)
//!     -> disabled (out of the index, still in the table)
//!     -> destroyed (out of the table, may cascade to children)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::ids::{ObjectId, PlayerId, Tick};
use crate::core::tagged;
use crate::core::vec2::Vec2;
use crate::game::shape::{Shape, ShapeGroup};
use crate::game::snapshot::SnapshotError;
use crate::game::trigger::{Action, ActionArgs, TriggerSet, Verdict};

/// Errors raised by object operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// Referenced object is not in the table
    #[error("Object {0} not found")]
    NotFound(ObjectId),

    /// Action is in the object's disabled set
    #[error("Action {action} is disabled on object {id}")]
    ActionDisabled {
        /// Object id
        id: ObjectId,
        /// Rejected action
        action: Action,
    },

    /// A trigger cancelled the action
    #[error("Action {action} on object {id} was vetoed by a trigger")]
    Vetoed {
        /// Object id
        id: ObjectId,
        /// Vetoed action
        action: Action,
    },
}

/// Serialized object: `{"_type": <registered type>, "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Registered type name
    #[serde(rename = "_type")]
    pub type_name: String,
    /// Object state
    pub data: Value,
}

impl ObjectSnapshot {
    /// Object id carried in the payload.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.data.get("id").and_then(Value::as_u64).map(ObjectId)
    }
}

/// A simulation entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameObject {
    /// Unique id
    pub id: ObjectId,

    /// Registered type name (carried by the snapshot envelope)
    #[serde(skip)]
    pub type_name: String,

    /// Content configuration this object was built from
    #[serde(default)]
    pub config_id: Option<String>,

    /// Owning player, if any
    #[serde(default)]
    pub player_id: Option<PlayerId>,

    /// Authoritative position. `None` means not in the world.
    pub position: Option<Vec2>,

    /// Interpolated render position
    #[serde(default)]
    pub view_position: Option<Vec2>,

    /// Orientation (radians)
    #[serde(default)]
    pub angle: f64,

    /// Collision geometry
    #[serde(default)]
    pub shapes: ShapeGroup,

    /// Participates in physics and updates
    pub enabled: bool,

    /// Drawn by renderers
    pub visible: bool,

    /// Tick of the last state change (delta snapshot cutoff)
    pub last_change: Tick,

    /// Tick of creation
    #[serde(default)]
    pub created_tick: Tick,

    /// Owned child objects
    #[serde(default, with = "tagged::set")]
    pub child_object_ids: BTreeSet<ObjectId>,

    /// Actions rejected before triggers run
    #[serde(default, with = "tagged::set")]
    pub disabled_actions: BTreeSet<Action>,

    /// Destroy removes the object (and children) instead of disabling it
    pub remove_on_destroy: bool,

    /// Content-defined state
    #[serde(default)]
    pub data: BTreeMap<String, Value>,

    /// Action interceptors (not serialized)
    #[serde(skip)]
    pub triggers: TriggerSet,
}

impl GameObject {
    /// Create a detached, disabled object.
    pub fn new(id: ObjectId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            config_id: None,
            player_id: None,
            position: None,
            view_position: None,
            angle: 0.0,
            shapes: ShapeGroup::default(),
            enabled: false,
            visible: true,
            last_change: 0,
            created_tick: 0,
            child_object_ids: BTreeSet::new(),
            disabled_actions: BTreeSet::new(),
            remove_on_destroy: true,
            data: BTreeMap::new(),
            triggers: TriggerSet::default(),
        }
    }

    /// Set the config id.
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Attach a shape.
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.add(shape);
        self
    }

    /// True when positioned and enabled.
    pub fn is_in_world(&self) -> bool {
        self.enabled && self.position.is_some()
    }

    /// Render position, falling back to the authoritative one.
    pub fn view_position(&self) -> Option<Vec2> {
        self.view_position.or(self.position)
    }

    /// Record a state change at `tick`.
    #[inline]
    pub fn mark_changed(&mut self, tick: Tick) {
        self.last_change = tick;
    }

    /// Data value by key.
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a data value.
    pub fn set_data_value(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Run `action` through the trigger pipeline, then `core` if allowed.
    pub fn perform<R>(
        &mut self,
        action: Action,
        args: &ActionArgs,
        core: impl FnOnce(&mut Self, &ActionArgs) -> R,
    ) -> Result<R, ObjectError> {
        if self.disabled_actions.contains(&action) {
            return Err(ObjectError::ActionDisabled { id: self.id, action });
        }
        if TriggerSet::invoke(self, &action, args) == Verdict::Cancel {
            return Err(ObjectError::Vetoed { id: self.id, action });
        }
        Ok(core(self, args))
    }

    /// Serialize into a tagged snapshot.
    pub fn snapshot(&self) -> Result<ObjectSnapshot, SnapshotError> {
        Ok(ObjectSnapshot {
            type_name: self.type_name.clone(),
            data: serde_json::to_value(self)?,
        })
    }

    /// Overwrite state from a snapshot, keeping triggers and type name.
    pub fn load_snapshot(&mut self, snapshot: &ObjectSnapshot) -> Result<(), SnapshotError> {
        let mut loaded: GameObject = serde_json::from_value(snapshot.data.clone())?;
        loaded.type_name = std::mem::take(&mut self.type_name);
        loaded.triggers = std::mem::take(&mut self.triggers);
        *self = loaded;
        Ok(())
    }
}

/// Move `target`'s view position `fraction` of the way toward `toward`'s.
pub fn update_view_position(target: &mut GameObject, toward: &GameObject, fraction: f64) {
    if let (Some(p1), Some(p2)) = (target.view_position(), toward.view_position()) {
        target.view_position = Some(p1.lerp(p2, fraction));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::shape::COLLISION_SENSOR;
    use serde_json::json;

    fn sample() -> GameObject {
        let mut obj = GameObject::new(ObjectId(3), "crate")
            .with_config_id("wooden_crate")
            .with_shape(Shape::circle(4.0).with_collision_type(COLLISION_SENSOR));
        obj.position = Some(Vec2::new(16.0, 32.0));
        obj.enabled = true;
        obj.angle = 1.25;
        obj.last_change = 9;
        obj.child_object_ids.insert(ObjectId(8));
        obj.disabled_actions.insert(Action::ReceivePush);
        obj.set_data_value("health", json!(40));
        obj
    }

    #[test]
    fn test_new_object_is_detached() {
        let obj = GameObject::new(ObjectId(1), "thing");
        assert!(!obj.enabled);
        assert!(obj.position.is_none());
        assert!(!obj.is_in_world());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let original = sample();
        let snapshot = original.snapshot().unwrap();
        assert_eq!(snapshot.type_name, "crate");
        assert_eq!(snapshot.object_id(), Some(ObjectId(3)));
        assert_eq!(snapshot.data["position"]["_type"], json!("Vector2"));
        assert_eq!(snapshot.data["child_object_ids"]["_type"], json!("set"));

        let mut fresh = GameObject::new(ObjectId(3), "crate");
        fresh.load_snapshot(&snapshot).unwrap();
        assert_eq!(fresh.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn test_load_keeps_triggers() {
        let mut obj = GameObject::new(ObjectId(3), "crate");
        obj.triggers.add(Action::Move, "stay", std::sync::Arc::new(|_, _| Verdict::Cancel));
        obj.load_snapshot(&sample().snapshot().unwrap()).unwrap();
        assert_eq!(obj.triggers.count(&Action::Move), 1);
        assert_eq!(obj.type_name, "crate");
    }

    #[test]
    fn test_view_interpolation() {
        let mut a = GameObject::new(ObjectId(1), "thing");
        a.position = Some(Vec2::new(0.0, 0.0));
        let mut b = GameObject::new(ObjectId(1), "thing");
        b.position = Some(Vec2::new(10.0, 20.0));

        update_view_position(&mut a, &b, 0.5);
        assert_eq!(a.view_position, Some(Vec2::new(5.0, 10.0)));
        // Authoritative position is untouched.
        assert_eq!(a.position, Some(Vec2::new(0.0, 0.0)));
    }
}
