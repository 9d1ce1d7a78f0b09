//! World
//!
//! The simulation state owned by one game context: clock, object table,
//! physics, players, event bus, type registry and remote client sessions.
//! Content and the context mutate the simulation exclusively through this
//! struct; there is no global game state.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::clock::{Clock, ClockMode};
use crate::core::ids::{ClientId, EventId, IdGenerator, ObjectId, PlayerId, Tick};
use crate::core::vec2::Vec2;
use crate::game::event_bus::EventBus;
use crate::game::events::{Event, EventKind, ObjectOp};
use crate::game::object::{GameObject, ObjectError};
use crate::game::objects::ObjectManager;
use crate::game::physics::{CompletionFn, PhysicsConfig, PhysicsEngine};
use crate::game::player::{Player, PlayerManager};
use crate::game::registry::ObjectRegistry;
use crate::game::snapshot::SnapshotError;
use crate::game::trigger::{Action, ActionArgs};
use crate::network::session::RemoteClient;

/// Simulation configuration.
#[derive(Debug, Clone, Default)]
pub struct GameConfig {
    /// Ticks per second; `None` runs uncapped (one tick per step)
    pub tick_rate: Option<u32>,
    /// Skip physics and content update; state arrives from a server
    pub client_only_mode: bool,
}

/// Simulation state.
#[derive(Debug)]
pub struct World {
    /// Configuration
    pub config: GameConfig,
    /// Tick source
    pub clock: Clock,
    /// Live objects
    pub objects: ObjectManager,
    /// Grid physics
    pub physics: PhysicsEngine,
    /// Players
    pub players: PlayerManager,
    /// Pending events
    pub bus: EventBus,
    /// Snapshot type table
    pub registry: ObjectRegistry,
    remote_clients: BTreeMap<ClientId, RemoteClient>,
    object_ids: IdGenerator,
    player_ids: IdGenerator,
}

impl World {
    /// Empty world.
    pub fn new(config: GameConfig, physics: PhysicsConfig) -> Self {
        Self {
            clock: Clock::new(ClockMode::from_rate(config.tick_rate)),
            config,
            objects: ObjectManager::new(),
            physics: PhysicsEngine::new(physics),
            players: PlayerManager::new(),
            bus: EventBus::new(),
            registry: ObjectRegistry::new(),
            remote_clients: BTreeMap::new(),
            object_ids: IdGenerator::new(),
            player_ids: IdGenerator::new(),
        }
    }

    /// Current tick.
    #[inline]
    pub fn tick(&self) -> Tick {
        self.clock.ticks()
    }

    /// Drop all objects, players' state is kept. Pending events and buffered
    /// moves are discarded.
    pub fn clear_objects(&mut self) {
        self.objects.clear();
        self.physics.clear();
        self.bus.clear();
    }

    // =========================================================================
    // Ids
    // =========================================================================

    /// Fresh object id.
    pub fn next_object_id(&mut self) -> ObjectId {
        self.object_ids.next_object()
    }

    /// Fresh player id.
    pub fn next_player_id(&mut self) -> PlayerId {
        self.player_ids.next_player()
    }

    /// Keep future object ids above `id`.
    pub fn observe_object_id(&mut self, id: ObjectId) {
        self.object_ids.observe(id.get());
    }

    /// Keep future player ids above `id`.
    pub fn observe_player_id(&mut self, id: PlayerId) {
        self.player_ids.observe(id.get());
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Build a detached object of a registered type with a fresh id.
    pub fn create_object(&mut self, type_name: &str) -> Result<GameObject, SnapshotError> {
        let id = self.next_object_id();
        let mut obj = self.registry.create(type_name, id)?;
        obj.created_tick = self.tick();
        Ok(obj)
    }

    /// Add an object to the table. Objects already in the world enter the
    /// spatial index at their position.
    pub fn add_object(&mut self, mut obj: GameObject) -> ObjectId {
        let id = obj.id;
        self.observe_object_id(id);
        let tick = self.tick();
        let events = if obj.is_in_world() {
            self.physics.add_object(&mut obj, tick)
        } else {
            Vec::new()
        };
        self.objects.add(obj);
        self.add_events(events);
        id
    }

    /// Run `action` on object `id` through its triggers, then `core`.
    pub fn perform<R>(
        &mut self,
        id: ObjectId,
        action: Action,
        args: &ActionArgs,
        core: impl FnOnce(&mut GameObject, &ActionArgs) -> R,
    ) -> Result<R, ObjectError> {
        let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
        obj.perform(action, args, core)
    }

    /// Place an object in the world at `position` and enable it.
    pub fn spawn_object(&mut self, id: ObjectId, position: Vec2) -> Result<(), ObjectError> {
        let tick = self.tick();
        let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
        obj.perform(Action::Spawn, &ActionArgs::at(position), |obj, _| obj.enabled = true)?;
        let events = self.physics.update_position(obj, Some(position), true, None, tick);
        self.add_events(events);
        Ok(())
    }

    /// Request a collision-checked move, resolved by the next physics update.
    pub fn move_object(
        &mut self,
        id: ObjectId,
        position: Vec2,
        on_complete: Option<CompletionFn>,
    ) -> Result<(), ObjectError> {
        let tick = self.tick();
        let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
        obj.perform(Action::Move, &ActionArgs::at(position), |_, _| ())?;
        self.physics.update_position(obj, Some(position), false, on_complete, tick);
        Ok(())
    }

    /// Move immediately without collision checks.
    pub fn teleport_object(&mut self, id: ObjectId, position: Vec2) -> Result<(), ObjectError> {
        let tick = self.tick();
        let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
        obj.perform(Action::Move, &ActionArgs::at(position), |_, _| ())?;
        let events = self.physics.update_position(obj, Some(position), true, None, tick);
        self.add_events(events);
        Ok(())
    }

    /// Enable an object and return it to the index.
    pub fn enable_object(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        self.set_enabled(id, true)
    }

    /// Disable an object; it stays in the table but leaves the index.
    pub fn disable_object(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&mut self, id: ObjectId, enabled: bool) -> Result<(), ObjectError> {
        let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
        obj.enabled = enabled;
        self.physics.sync_object(obj);
        Ok(())
    }

    /// Queue the removal of an object for the next event pass.
    pub fn remove_object(&mut self, id: ObjectId) -> EventId {
        self.add_event(Event::remove_object(id))
    }

    /// Remove an object now. Removing a missing object is a no-op.
    pub fn remove_object_now(&mut self, id: ObjectId) -> Option<GameObject> {
        self.physics.remove_object(id);
        let removed = self.objects.remove(id);
        if removed.is_none() {
            debug!(object_id = %id, "Object already removed");
        }
        removed
    }

    /// Destroy an object: queue removal of it and its children, or only
    /// disable it when it is not removable.
    pub fn destroy_object(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        let (remove, children) = self.perform(id, Action::Destroy, &ActionArgs::default(), |obj, _| {
            (obj.remove_on_destroy, obj.child_object_ids.clone())
        })?;
        if !remove {
            return self.disable_object(id);
        }
        for child in children {
            self.remove_object(child);
        }
        self.remove_object(id);
        Ok(())
    }

    /// Apply a deferred object operation.
    pub fn apply_object_op(&mut self, id: ObjectId, op: ObjectOp) -> Result<(), ObjectError> {
        match op {
            ObjectOp::Enable => self.enable_object(id),
            ObjectOp::Disable => self.disable_object(id),
            ObjectOp::Move { position } => self.move_object(id, position, None),
            ObjectOp::Teleport { position } => self.teleport_object(id, position),
            ObjectOp::Destroy => self.destroy_object(id),
            op => {
                let obj = self.objects.get_mut(id).ok_or(ObjectError::NotFound(id))?;
                match op {
                    ObjectOp::SetData { key, value } => obj.set_data_value(key, value),
                    ObjectOp::RemoveData { key } => {
                        obj.data.remove(&key);
                    }
                    ObjectOp::SetVisible { visible } => obj.visible = visible,
                    ObjectOp::SetAngle { angle } => obj.angle = angle,
                    ObjectOp::AddChild { child } => {
                        obj.child_object_ids.insert(child);
                    }
                    ObjectOp::RemoveChild { child } => {
                        obj.child_object_ids.remove(&child);
                    }
                    ObjectOp::Enable
                    | ObjectOp::Disable
                    | ObjectOp::Move { .. }
                    | ObjectOp::Teleport { .. }
                    | ObjectOp::Destroy => {}
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Add an event to the bus. Client-relevant events are also queued for
    /// every remote client.
    pub fn add_event(&mut self, mut event: Event) -> EventId {
        let tick = self.tick();
        self.bus.stamp(&mut event, tick);
        if event.is_client_event && event.kind.is_serializable() {
            for client in self.remote_clients.values_mut() {
                client.add_event(event.clone());
            }
        }
        self.bus.add(event)
    }

    /// Add several events.
    pub fn add_events(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.add_event(event);
        }
    }

    /// Remove and return pending sound events (renderer hook).
    pub fn drain_sound_events(&mut self) -> Vec<Event> {
        self.bus.drain_where(|e| matches!(e.kind, EventKind::Sound { .. }))
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Register a new player for `client_id`.
    pub fn add_player(&mut self, client_id: ClientId, player_type: u32, is_human: bool) -> PlayerId {
        let id = self.next_player_id();
        self.players.add(Player::new(id, client_id, player_type, is_human));
        id
    }

    /// Apply a camera adjustment. Returns false when the player is unknown.
    pub fn apply_view(&mut self, player_id: PlayerId, distance_diff: f64, center_diff: Vec2, orientation_diff: f64) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) => {
                player.camera.adjust(distance_diff, center_diff, orientation_diff);
                true
            }
            None => {
                warn!(player_id = %player_id, "View event for unknown player");
                false
            }
        }
    }

    // =========================================================================
    // Remote clients
    // =========================================================================

    /// Session of `client_id`, created on first use.
    pub fn remote_client(&mut self, client_id: &ClientId) -> &mut RemoteClient {
        self.remote_clients
            .entry(client_id.clone())
            .or_insert_with(|| RemoteClient::new(client_id.clone()))
    }

    /// Session of `client_id`, if known.
    pub fn get_remote_client(&self, client_id: &ClientId) -> Option<&RemoteClient> {
        self.remote_clients.get(client_id)
    }

    /// Connected sessions in id order.
    pub fn remote_clients(&self) -> impl Iterator<Item = &RemoteClient> {
        self.remote_clients.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
