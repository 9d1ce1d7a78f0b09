//! Game Events
//!
//! Tagged, timestamped messages driving every state transition. Each event
//! carries two delivery-scope flags: client-relevant (forwarded to connected
//! clients) and server-relevant (processed by the authoritative bus).
//!
//! Delayed and periodic events carry closures and are therefore never
//! serialized; they live only on the bus that created them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::ids::{EventId, ObjectId, PlayerId, Tick};
use crate::core::vec2::Vec2;

/// Raw input payload (key/value pairs produced by the input layer).
pub type InputData = BTreeMap<String, Value>;

/// Payload function of a delayed event.
pub type DelayedFn = Arc<dyn Fn(&Value) -> Vec<Event> + Send + Sync>;

/// Payload function of a periodic event. Returns follow-up events and
/// whether the periodic event should be removed.
pub type PeriodicFn = Arc<dyn Fn(&Value) -> (Vec<Event>, bool) + Send + Sync>;

/// Deferred object operation, dispatched by the context on the target object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ObjectOp {
    /// Set a data value
    SetData {
        /// Key
        key: String,
        /// Value
        value: Value,
    },
    /// Remove a data value
    RemoveData {
        /// Key
        key: String,
    },
    /// Enable and re-enter the spatial index
    Enable,
    /// Disable and leave the spatial index
    Disable,
    /// Toggle visibility
    SetVisible {
        /// New visibility
        visible: bool,
    },
    /// Set orientation
    SetAngle {
        /// Angle in radians
        angle: f64,
    },
    /// Request a collision-checked move
    Move {
        /// Destination
        position: Vec2,
    },
    /// Move immediately, skipping collision checks
    Teleport {
        /// Destination
        position: Vec2,
    },
    /// Destroy (remove, or disable when the object is not removable)
    Destroy,
    /// Adopt a child object
    AddChild {
        /// Child id
        child: ObjectId,
    },
    /// Release a child object
    RemoveChild {
        /// Child id
        child: ObjectId,
    },
}

/// Event fired once the clock reaches a target tick.
#[derive(Clone)]
pub struct DelayedEvent {
    /// Tick at or after which the payload runs
    pub execute_at: Tick,
    /// Payload data passed to the function
    pub data: Value,
    /// Payload function
    pub func: DelayedFn,
}

impl DelayedEvent {
    /// Run the payload if due. Returns follow-up events when it fired.
    pub fn run(&self, tick: Tick) -> Option<Vec<Event>> {
        (tick >= self.execute_at).then(|| (self.func)(&self.data))
    }
}

impl fmt::Debug for DelayedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedEvent")
            .field("execute_at", &self.execute_at)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Event firing every `interval` ticks until its payload asks for removal.
#[derive(Clone)]
pub struct PeriodicEvent {
    /// Ticks between runs
    pub interval: Tick,
    /// Tick of the last run (`None` runs on the next pass)
    pub last_run: Option<Tick>,
    /// Payload data passed to the function
    pub data: Value,
    /// Payload function
    pub func: PeriodicFn,
}

impl PeriodicEvent {
    /// Run the payload if due, re-arming the next fire tick.
    ///
    /// Returns the follow-up events and whether the event should be removed.
    pub fn run(&mut self, tick: Tick) -> (Vec<Event>, bool) {
        let due = match self.last_run {
            None => true,
            Some(last) => last + self.interval <= tick,
        };
        if !due {
            return (Vec::new(), false);
        }
        self.last_run = Some(tick);
        (self.func)(&self.data)
    }
}

impl fmt::Debug for PeriodicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicEvent")
            .field("interval", &self.interval)
            .field("last_run", &self.last_run)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Event payload, dispatched by kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "_type", content = "data")]
pub enum EventKind {
    /// Player input, handled by content
    #[serde(rename = "InputEvent")]
    Input {
        /// Player that produced the input
        player_id: PlayerId,
        /// Raw input
        input_data: InputData,
    },

    /// Console / admin command, handled by content
    #[serde(rename = "AdminCommandEvent")]
    AdminCommand {
        /// Issuing player
        player_id: Option<PlayerId>,
        /// Command text
        value: String,
    },

    /// Content-defined event
    #[serde(rename = "ContentEvent")]
    Content {
        /// Payload
        data: Value,
    },

    /// Camera adjustment
    #[serde(rename = "ViewEvent")]
    View {
        /// Player whose camera changes
        player_id: PlayerId,
        /// Zoom change
        distance_diff: f64,
        /// Center change
        center_diff: Vec2,
        /// Orientation change
        orientation_diff: f64,
    },

    /// Object removal request
    #[serde(rename = "RemoveObjectEvent")]
    RemoveObject {
        /// Object to remove
        object_id: ObjectId,
    },

    /// Fires once at a target tick
    #[serde(skip)]
    Delayed(DelayedEvent),

    /// Fires on an interval
    #[serde(skip)]
    Periodic(PeriodicEvent),

    /// A committed position change
    #[serde(rename = "PositionChangeEvent")]
    PositionChange {
        /// Moved object
        obj_id: ObjectId,
        /// Position before
        old_pos: Option<Vec2>,
        /// Position after
        new_pos: Option<Vec2>,
        /// Object belongs to a player
        is_player_obj: bool,
    },

    /// Deferred object operation
    #[serde(rename = "ObjectEvent")]
    Object {
        /// Target object
        obj_id: ObjectId,
        /// Operation to apply
        op: ObjectOp,
    },

    /// Sound cue for renderers
    #[serde(rename = "SoundEvent")]
    Sound {
        /// Sound asset id
        sound_id: String,
        /// Where the sound plays
        position: Option<Vec2>,
    },
}

impl EventKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Input { .. } => "input",
            EventKind::AdminCommand { .. } => "admin_command",
            EventKind::Content { .. } => "content",
            EventKind::View { .. } => "view",
            EventKind::RemoveObject { .. } => "remove_object",
            EventKind::Delayed(_) => "delayed",
            EventKind::Periodic(_) => "periodic",
            EventKind::PositionChange { .. } => "position_change",
            EventKind::Object { .. } => "object",
            EventKind::Sound { .. } => "sound",
        }
    }

    /// Whether this kind can cross a process boundary.
    pub fn is_serializable(&self) -> bool {
        !matches!(self, EventKind::Delayed(_) | EventKind::Periodic(_))
    }
}

/// A bus event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Id, assigned by the bus when zero
    #[serde(default)]
    pub id: EventId,
    /// Tick of creation, stamped by the bus when zero
    #[serde(default)]
    pub creation_time: Tick,
    /// Forward to connected clients
    #[serde(default)]
    pub is_client_event: bool,
    /// Process on the authoritative side
    #[serde(default = "default_true")]
    pub is_server_event: bool,
    /// Payload
    pub kind: EventKind,
}

fn default_true() -> bool {
    true
}

impl Event {
    /// Server-side event of `kind`, id and time left for the bus to assign.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId(0),
            creation_time: 0,
            is_client_event: false,
            is_server_event: true,
            kind,
        }
    }

    /// Mark as client-relevant.
    pub fn for_clients(mut self) -> Self {
        self.is_client_event = true;
        self
    }

    /// Input event.
    pub fn input(player_id: PlayerId, input_data: InputData) -> Self {
        Self::new(EventKind::Input { player_id, input_data })
    }

    /// Admin command event.
    pub fn admin_command(player_id: Option<PlayerId>, value: impl Into<String>) -> Self {
        Self::new(EventKind::AdminCommand { player_id, value: value.into() })
    }

    /// Content event.
    pub fn content(data: Value) -> Self {
        Self::new(EventKind::Content { data })
    }

    /// Camera zoom event.
    pub fn view(player_id: PlayerId, distance_diff: f64) -> Self {
        Self::new(EventKind::View {
            player_id,
            distance_diff,
            center_diff: Vec2::ZERO,
            orientation_diff: 0.0,
        })
    }

    /// Object removal request (client-relevant).
    pub fn remove_object(object_id: ObjectId) -> Self {
        Self::new(EventKind::RemoveObject { object_id }).for_clients()
    }

    /// Event firing `delay` ticks after `now`.
    pub fn delayed(now: Tick, delay: Tick, data: Value, func: DelayedFn) -> Self {
        Self::new(EventKind::Delayed(DelayedEvent { execute_at: now + delay, data, func }))
    }

    /// Event firing every `interval` ticks. Unless `run_immediately`, the
    /// first run is one interval after `now`.
    pub fn periodic(now: Tick, interval: Tick, run_immediately: bool, data: Value, func: PeriodicFn) -> Self {
        Self::new(EventKind::Periodic(PeriodicEvent {
            interval,
            last_run: if run_immediately { None } else { Some(now) },
            data,
            func,
        }))
    }

    /// Position change notification.
    pub fn position_change(obj_id: ObjectId, old_pos: Option<Vec2>, new_pos: Option<Vec2>, is_player_obj: bool) -> Self {
        Self::new(EventKind::PositionChange { obj_id, old_pos, new_pos, is_player_obj })
    }

    /// Deferred object operation.
    pub fn object(obj_id: ObjectId, op: ObjectOp) -> Self {
        Self::new(EventKind::Object { obj_id, op })
    }

    /// Sound cue (client-relevant).
    pub fn sound(sound_id: impl Into<String>, position: Option<Vec2>) -> Self {
        Self::new(EventKind::Sound { sound_id: sound_id.into(), position }).for_clients()
    }
}

// =============================================================================
// TESTS
// =============================================================================
