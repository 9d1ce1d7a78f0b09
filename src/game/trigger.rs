//! Action Triggers
//!
//! Every mutating object action runs through an interception pipeline:
//!
//! 1. If the action is in the object's disabled set, it is rejected.
//! 2. Every trigger registered for the action runs, in trigger-id order.
//! 3. If any trigger returned [`Verdict::Cancel`], the core logic is skipped.
//! 4. Otherwise the core logic runs.
//!
//! Game modes hook object behaviour here instead of subclassing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::core::ids::ObjectId;
use crate::core::vec2::Vec2;
use crate::game::object::GameObject;

/// Name of an interceptable action.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Action {
    /// Object enters the world
    Spawn,
    /// Requested position change
    Move,
    /// Object occupies the same cell as another
    CollisionWith,
    /// Damage from another object
    ReceiveDamage,
    /// Push from another object
    ReceivePush,
    /// Grabbed by another object
    ReceiveGrab,
    /// Object removes itself from play
    Destroy,
    /// Content-defined action
    Custom(String),
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Spawn => "spawn",
            Action::Move => "move",
            Action::CollisionWith => "collision_with",
            Action::ReceiveDamage => "receive_damage",
            Action::ReceivePush => "receive_push",
            Action::ReceiveGrab => "receive_grab",
            Action::Destroy => "destroy",
            Action::Custom(name) => name,
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            "spawn" => Action::Spawn,
            "move" => Action::Move,
            "collision_with" => Action::CollisionWith,
            "receive_damage" => Action::ReceiveDamage,
            "receive_push" => Action::ReceivePush,
            "receive_grab" => Action::ReceiveGrab,
            "destroy" => Action::Destroy,
            _ => Action::Custom(name),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::from(name.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments shared by the core logic and every trigger of an action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionArgs {
    /// Counterpart object (attacker, pusher, collider, ...)
    pub other: Option<ObjectId>,
    /// Target position
    pub position: Option<Vec2>,
    /// Direction of travel or push
    pub direction: Option<Vec2>,
    /// Magnitude (damage, push power, ...)
    pub amount: Option<f64>,
    /// Free-form payload for custom actions
    pub data: serde_json::Value,
}

impl ActionArgs {
    /// Arguments naming a target position.
    pub fn at(position: Vec2) -> Self {
        Self { position: Some(position), ..Self::default() }
    }

    /// Arguments naming a counterpart object.
    pub fn with_other(other: ObjectId) -> Self {
        Self { other: Some(other), ..Self::default() }
    }
}

/// Trigger decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Let the action proceed
    Allow,
    /// Veto the action
    Cancel,
}

/// Trigger callback. Receives the acting object and the action arguments.
pub type TriggerFn = Arc<dyn Fn(&mut GameObject, &ActionArgs) -> Verdict + Send + Sync>;

/// Triggers of one object, keyed by action then trigger id.
#[derive(Clone, Default)]
pub struct TriggerSet {
    triggers: BTreeMap<Action, BTreeMap<String, TriggerFn>>,
}

impl TriggerSet {
    /// Register (or replace) trigger `id` on `action`.
    pub fn add(&mut self, action: Action, id: impl Into<String>, trigger: TriggerFn) {
        self.triggers.entry(action).or_default().insert(id.into(), trigger);
    }

    /// Remove trigger `id` from `action`. Returns whether it existed.
    pub fn remove(&mut self, action: &Action, id: &str) -> bool {
        let Some(by_id) = self.triggers.get_mut(action) else {
            return false;
        };
        let removed = by_id.remove(id).is_some();
        if by_id.is_empty() {
            self.triggers.remove(action);
        }
        removed
    }

    /// Number of triggers registered on `action`.
    pub fn count(&self, action: &Action) -> usize {
        self.triggers.get(action).map_or(0, BTreeMap::len)
    }

    /// Snapshot of the handlers for `action`, so they can run while the
    /// object is mutably borrowed.
    fn handlers(&self, action: &Action) -> Vec<TriggerFn> {
        self.triggers
            .get(action)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Run every trigger for `action` on `obj`.
    ///
    /// All triggers run even after one cancels. Returns [`Verdict::Cancel`]
    /// if any of them cancelled.
    pub fn invoke(obj: &mut GameObject, action: &Action, args: &ActionArgs) -> Verdict {
        let handlers = obj.triggers.handlers(action);
        let mut verdict = Verdict::Allow;
        for handler in handlers {
            if handler(obj, args) == Verdict::Cancel {
                verdict = Verdict::Cancel;
            }
        }
        verdict
    }
}

impl fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (action, by_id) in &self.triggers {
            map.entry(&action.as_str(), &by_id.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ObjectId;
    use crate::game::object::ObjectError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object() -> GameObject {
        GameObject::new(ObjectId(1), "thing")
    }

    #[test]
    fn test_action_names_round_trip() {
        assert_eq!(Action::from("receive_damage"), Action::ReceiveDamage);
        assert_eq!(Action::from("craft"), Action::Custom("craft".into()));
        assert_eq!(String::from(Action::CollisionWith), "collision_with");
    }

    #[test]
    fn test_all_triggers_run_and_any_cancel_vetoes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut obj = object();

        let c1 = calls.clone();
        obj.triggers.add(Action::ReceiveDamage, "a", Arc::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
            Verdict::Cancel
        }));
        let c2 = calls.clone();
        obj.triggers.add(Action::ReceiveDamage, "b", Arc::new(move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
            Verdict::Allow
        }));

        let mut core_ran = false;
        let result = obj.perform(Action::ReceiveDamage, &ActionArgs::default(), |_, _| {
            core_ran = true;
        });

        assert!(matches!(result, Err(ObjectError::Vetoed { .. })));
        assert!(!core_ran);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_action_skips_triggers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut obj = object();
        let c = calls.clone();
        obj.triggers.add(Action::Move, "count", Arc::new(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Verdict::Allow
        }));
        obj.disabled_actions.insert(Action::Move);

        let result = obj.perform(Action::Move, &ActionArgs::default(), |_, _| ());
        assert!(matches!(result, Err(ObjectError::ActionDisabled { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_can_mutate_object_and_be_removed() {
        let mut obj = object();
        obj.triggers.add(
            Action::Custom("jump".into()),
            "mark",
            Arc::new(|obj, _| {
                obj.data.insert("jumped".into(), serde_json::json!(true));
                Verdict::Allow
            }),
        );

        let value = obj.perform(Action::Custom("jump".into()), &ActionArgs::default(), |_, _| 7);
        assert_eq!(value.unwrap(), 7);
        assert_eq!(obj.data.get("jumped"), Some(&serde_json::json!(true)));

        assert!(obj.triggers.remove(&Action::Custom("jump".into()), "mark"));
        assert!(!obj.triggers.remove(&Action::Custom("jump".into()), "mark"));
        assert_eq!(obj.triggers.count(&Action::Custom("jump".into())), 0);
    }
}
