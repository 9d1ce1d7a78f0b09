//! Players
//!
//! A player is the session-level identity of a participant: which client it
//! belongs to, its camera, and the object it controls. The player references
//! its object by id and does not own it.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::ids::{ClientId, ObjectId, PlayerId};
use crate::core::vec2::Vec2;
use crate::game::events::Event;

// =============================================================================
// CAMERA
// =============================================================================

/// Default camera zoom distance.
pub const DEFAULT_CAMERA_DISTANCE: f64 = 300.0;

/// Per-player view state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Object the camera tracks
    pub follow_obj_id: Option<ObjectId>,
    /// Zoom distance
    pub distance: f64,
    /// Extra rotation
    pub angle: f64,
    /// Offset from the tracked position
    pub position_offset: Vec2,
    /// 0 rotates with the followed object, other values are fixed views
    pub view_type: u8,
    /// Center used when nothing is followed
    pub center: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            follow_obj_id: None,
            distance: DEFAULT_CAMERA_DISTANCE,
            angle: 0.0,
            position_offset: Vec2::ZERO,
            view_type: 0,
            center: Vec2::ZERO,
        }
    }
}

impl Camera {
    /// Camera following `obj_id`.
    pub fn following(obj_id: ObjectId) -> Self {
        Self { follow_obj_id: Some(obj_id), ..Self::default() }
    }

    /// Apply a view adjustment.
    pub fn adjust(&mut self, distance_diff: f64, center_diff: Vec2, orientation_diff: f64) {
        self.distance += distance_diff;
        self.center = self.center + center_diff;
        self.angle += orientation_diff;
    }

    /// Effective view angle given the followed object's orientation.
    pub fn view_angle(&self, followed_angle: Option<f64>) -> f64 {
        match (self.view_type, followed_angle) {
            (0, Some(angle)) => self.angle + angle,
            _ => self.angle,
        }
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Player id
    pub uid: PlayerId,
    /// Owning client
    pub client_id: ClientId,
    /// Content-defined role
    pub player_type: u32,
    /// Driven by a person (vs. an agent)
    pub is_human: bool,
    /// View state
    pub camera: Camera,
    /// Controlled object
    pub obj_id: Option<ObjectId>,
    /// Pending input, drained once per client step (not serialized)
    #[serde(skip)]
    pub events: Vec<Event>,
    /// Content-defined session state
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Player {
    /// New player without a controlled object.
    pub fn new(uid: PlayerId, client_id: ClientId, player_type: u32, is_human: bool) -> Self {
        Self {
            uid,
            client_id,
            player_type,
            is_human,
            camera: Camera::default(),
            obj_id: None,
            events: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Take control of `obj_id` and point the camera at it.
    pub fn attach_object(&mut self, obj_id: ObjectId) {
        self.obj_id = Some(obj_id);
        self.camera.follow_obj_id = Some(obj_id);
    }

    /// Queue an input event.
    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Drain the pending input queue.
    pub fn pull_input_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Data value by key.
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a data value.
    pub fn set_data_value(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Overwrite replicated fields, keeping the pending queue.
    pub fn load_from(&mut self, other: Player) {
        let events = std::mem::take(&mut self.events);
        *self = other;
        self.events = events;
    }
}

// =============================================================================
// PLAYER MANAGER
// =============================================================================

/// All players, keyed by id.
#[derive(Debug, Default)]
pub struct PlayerManager {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a player.
    pub fn add(&mut self, player: Player) {
        self.players.insert(player.uid, player);
    }

    /// Player by id.
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Mutable player by id.
    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// First player owned by `client_id`.
    pub fn by_client(&self, client_id: &ClientId) -> Option<&Player> {
        self.players.values().find(|p| &p.client_id == client_id)
    }

    /// Remove a player.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Players in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Ids in order.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Number of players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when no player exists.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Drain every player's pending input.
    pub fn pull_events(&mut self) -> Vec<Event> {
        self.players.values_mut().flat_map(Player::pull_input_events).collect()
    }

    /// Snapshot of all players (`pm`).
    pub fn snapshot(&self) -> BTreeMap<PlayerId, Player> {
        self.players.clone()
    }

    /// Merge received players. Returns the ids that were new.
    pub fn load_snapshot(&mut self, players: BTreeMap<PlayerId, Player>) -> Vec<PlayerId> {
        let mut added = Vec::new();
        for (id, player) in players {
            match self.players.get_mut(&id) {
                Some(existing) => existing.load_from(player),
                None => {
                    self.players.insert(id, player);
                    added.push(id);
                }
            }
        }
        added
    }
}
