//! Grid Physics
//!
//! Deferred position resolution over the grid index.
//!
//! Moves are requested with [`PhysicsEngine::update_position`]. A request
//! that skips the collision check applies at once; every other request is
//! buffered per object (last writer wins) and resolved by
//! [`PhysicsEngine::update`] once per tick:
//!
//! 1. **Judge**: every request is checked against the index as it stood at
//!    the start of the update. For each enabled object already occupying the
//!    destination cell, every (mover type, other type) collision pair with a
//!    registered callback is invoked. All callbacks run; any `Block` rejects
//!    the move.
//! 2. **Commit**: passing requests update position and index, emit a
//!    position-change event and fire their completion callback.
//!
//! Judging before committing keeps outcomes independent of request order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::ids::{ObjectId, Tick};
use crate::core::vec2::Vec2;
use crate::game::events::Event;
use crate::game::grid::{Coord, GridSpace};
use crate::game::object::GameObject;
use crate::game::objects::ObjectManager;
use crate::game::shape::{CollisionType, COLLISION_DEFAULT};

/// Default world units per grid cell.
pub const DEFAULT_TILE_SIZE: f64 = 16.0;

/// Physics configuration.
#[derive(Clone, Debug)]
pub struct PhysicsConfig {
    /// World units per grid cell
    pub tile_size: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self { tile_size: DEFAULT_TILE_SIZE }
    }
}

/// Collision callback decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// The mover may enter the cell
    Pass,
    /// The move is rejected
    Block,
}

/// A mover meeting an occupant of its destination cell.
pub struct Collision<'a> {
    /// Object requesting the move
    pub mover: &'a mut GameObject,
    /// Object already in the destination cell
    pub other: &'a mut GameObject,
    /// Collision type of the mover's shape
    pub mover_type: CollisionType,
    /// Collision type of the occupant's shape
    pub other_type: CollisionType,
    /// Current tick
    pub tick: Tick,
    events: &'a mut Vec<Event>,
}

impl Collision<'_> {
    /// Queue a follow-up event.
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Collision callback for one unordered pair of collision types.
pub type CollisionCallback = Arc<dyn Fn(&mut Collision<'_>) -> CollisionOutcome + Send + Sync>;

/// Completion callback: receives the object id and whether the move
/// committed, and may return follow-up events.
pub type CompletionFn = Box<dyn FnOnce(ObjectId, bool) -> Vec<Event> + Send>;

struct PositionRequest {
    new_pos: Option<Vec2>,
    on_complete: Option<CompletionFn>,
}

struct AcceptedMove {
    id: ObjectId,
    new_pos: Option<Vec2>,
    coord: Option<Coord>,
    on_complete: Option<CompletionFn>,
}

/// Grid physics engine.
pub struct PhysicsEngine {
    config: PhysicsConfig,
    space: GridSpace,
    pending: BTreeMap<ObjectId, PositionRequest>,
    callbacks: HashMap<(CollisionType, CollisionType), CollisionCallback>,
}

impl PhysicsEngine {
    /// Create an engine with an empty index.
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            space: GridSpace::new(),
            pending: BTreeMap::new(),
            callbacks: HashMap::new(),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Spatial index.
    pub fn space(&self) -> &GridSpace {
        &self.space
    }

    /// Cell containing a world position (components rounded, not truncated).
    #[inline]
    pub fn vec_to_coord(&self, v: Vec2) -> Coord {
        Coord::new(
            (v.x / self.config.tile_size).round() as i64,
            (v.y / self.config.tile_size).round() as i64,
        )
    }

    /// World position of a cell origin.
    #[inline]
    pub fn coord_to_vec(&self, coord: Coord) -> Vec2 {
        Vec2::new(coord.x as f64 * self.config.tile_size, coord.y as f64 * self.config.tile_size)
    }

    /// Register `callback` for the pair `(a, b)` and its mirror `(b, a)`.
    pub fn set_collision_callback(&mut self, a: CollisionType, b: CollisionType, callback: CollisionCallback) {
        self.callbacks.insert((a, b), callback.clone());
        self.callbacks.insert((b, a), callback);
    }

    /// Register `callback` for default-vs-default collisions.
    pub fn set_default_collision_callback(&mut self, callback: CollisionCallback) {
        self.set_collision_callback(COLLISION_DEFAULT, COLLISION_DEFAULT, callback);
    }

    /// Enter an object into physics at its current position.
    pub fn add_object(&mut self, obj: &mut GameObject, tick: Tick) -> Vec<Event> {
        obj.mark_changed(tick);
        let position = obj.position;
        self.update_position(obj, position, true, None, tick)
    }

    /// Drop an object from the index and forget its pending request.
    pub fn remove_object(&mut self, id: ObjectId) {
        self.space.remove(id);
        self.pending.remove(&id);
    }

    /// Re-insert an enabled, positioned object into the index.
    pub fn sync_object(&mut self, obj: &GameObject) {
        match obj.position {
            Some(position) if obj.enabled => {
                let coord = self.vec_to_coord(position);
                self.space.move_to(coord, obj.id);
            }
            _ => self.space.remove(obj.id),
        }
    }

    /// Request a position change.
    ///
    /// With `skip_collision_check` the move applies now and the returned
    /// events hold the position-change event and completion follow-ups.
    /// Otherwise the request is buffered until [`PhysicsEngine::update`] and
    /// nothing is returned. `None` takes the object out of the world.
    pub fn update_position(
        &mut self,
        obj: &mut GameObject,
        new_pos: Option<Vec2>,
        skip_collision_check: bool,
        on_complete: Option<CompletionFn>,
        tick: Tick,
    ) -> Vec<Event> {
        if !skip_collision_check {
            self.pending.insert(obj.id, PositionRequest { new_pos, on_complete });
            return Vec::new();
        }

        let mut events = vec![Event::position_change(obj.id, obj.position, new_pos, obj.player_id.is_some())];
        obj.position = new_pos;
        obj.mark_changed(tick);
        // Disabled objects keep their position but stay out of the index.
        self.sync_object(obj);
        if let Some(callback) = on_complete {
            events.extend(callback(obj.id, true));
        }
        events
    }

    /// Number of buffered requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Empty the index and drop buffered requests. Callbacks are kept.
    pub fn clear(&mut self) {
        self.space.clear();
        self.pending.clear();
    }

    /// Resolve every buffered request. Returns the emitted events.
    pub fn update(&mut self, objects: &mut ObjectManager, tick: Tick) -> Vec<Event> {
        let requests = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        let mut accepted = Vec::with_capacity(requests.len());

        // Judge against the pre-update index.
        for (id, request) in requests {
            let PositionRequest { new_pos, on_complete } = request;
            let Some(mover) = objects.get(id) else {
                warn!(object_id = %id, "Dropping move request for missing object");
                continue;
            };
            if !mover.enabled {
                debug!(object_id = %id, "Dropping move request for disabled object");
                if let Some(callback) = on_complete {
                    events.extend(callback(id, false));
                }
                continue;
            }

            let Some(target) = new_pos else {
                accepted.push(AcceptedMove { id, new_pos: None, coord: None, on_complete });
                continue;
            };
            let target = Vec2::new(target.x.round(), target.y.round());
            let coord = self.vec_to_coord(target);

            if self.resolve_collisions(objects, id, coord, tick, &mut events) {
                debug!(object_id = %id, ?coord, "Move blocked");
                if let Some(callback) = on_complete {
                    events.extend(callback(id, false));
                }
            } else {
                accepted.push(AcceptedMove { id, new_pos: Some(target), coord: Some(coord), on_complete });
            }
        }

        // Commit.
        for AcceptedMove { id, new_pos, coord, on_complete } in accepted {
            let Some(obj) = objects.get_mut(id) else {
                continue;
            };
            let old_pos = obj.position;
            obj.position = new_pos;
            events.push(Event::position_change(id, old_pos, new_pos, obj.player_id.is_some()));
            match coord {
                Some(coord) => self.space.move_to(coord, id),
                None => self.space.remove(id),
            }
            if let Some(callback) = on_complete {
                events.extend(callback(id, true));
            }
        }

        events
    }

    /// Run every matching callback between `mover_id` and the occupants of
    /// `coord`. Returns true when any callback blocked.
    fn resolve_collisions(
        &self,
        objects: &mut ObjectManager,
        mover_id: ObjectId,
        coord: Coord,
        tick: Tick,
        events: &mut Vec<Event>,
    ) -> bool {
        let occupants: Vec<ObjectId> = self
            .space
            .objects_at(coord)
            .iter()
            .copied()
            .filter(|id| *id != mover_id)
            .collect();
        if occupants.is_empty() {
            return false;
        }

        let Some(mut mover) = objects.take(mover_id) else {
            return false;
        };
        let mover_types = mover.shapes.collision_types();
        let mut blocked = false;

        for other_id in occupants {
            let other_types = match objects.get(other_id) {
                Some(other) if other.enabled => other.shapes.collision_types(),
                _ => continue,
            };
            for mover_type in &mover_types {
                for other_type in &other_types {
                    let Some(callback) = self.callbacks.get(&(*mover_type, *other_type)).cloned() else {
                        continue;
                    };
                    let Some(other) = objects.get_mut(other_id) else {
                        continue;
                    };
                    mover.mark_changed(tick);
                    let mut collision = Collision {
                        mover: &mut mover,
                        other,
                        mover_type: *mover_type,
                        other_type: *other_type,
                        tick,
                        events: &mut *events,
                    };
                    if callback(&mut collision) == CollisionOutcome::Block {
                        blocked = true;
                    }
                }
            }
        }

        objects.restore(mover);
        blocked
    }
}

impl std::fmt::Debug for PhysicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngine")
            .field("config", &self.config)
            .field("indexed", &self.space.len())
            .field("pending", &self.pending.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::EventKind;
    use crate::game::shape::Shape;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn spawn(physics: &mut PhysicsEngine, objects: &mut ObjectManager, id: u64, cell: (i64, i64)) {
        let mut obj = GameObject::new(ObjectId(id), "thing").with_shape(Shape::circle(4.0));
        obj.enabled = true;
        obj.position = Some(physics.coord_to_vec(Coord::new(cell.0, cell.1)));
        physics.add_object(&mut obj, 0);
        objects.add(obj);
    }

    fn request(physics: &mut PhysicsEngine, objects: &mut ObjectManager, id: u64, cell: (i64, i64)) {
        let target = physics.coord_to_vec(Coord::new(cell.0, cell.1));
        let obj = objects.get_mut(ObjectId(id)).unwrap();
        physics.update_position(obj, Some(target), false, None, 0);
    }

    fn setup() -> (PhysicsEngine, ObjectManager) {
        (PhysicsEngine::new(PhysicsConfig::default()), ObjectManager::new())
    }

    #[test]
    fn test_vec_to_coord_rounds() {
        let physics = PhysicsEngine::new(PhysicsConfig::default());
        assert_eq!(physics.vec_to_coord(Vec2::new(7.9, -8.1)), Coord::new(0, -1));
        assert_eq!(physics.vec_to_coord(Vec2::new(8.1, 24.0)), Coord::new(1, 2));
        assert_eq!(physics.coord_to_vec(Coord::new(2, -1)), Vec2::new(32.0, -16.0));
    }

    #[test]
    fn test_blocking_collision_leaves_both_in_place() {
        let (mut physics, mut objects) = setup();
        physics.set_default_collision_callback(Arc::new(|_| CollisionOutcome::Block));
        spawn(&mut physics, &mut objects, 1, (0, 0));
        spawn(&mut physics, &mut objects, 2, (1, 0));

        let b_before = objects.get(ObjectId(2)).unwrap().position;
        request(&mut physics, &mut objects, 2, (0, 0));
        let events = physics.update(&mut objects, 1);

        assert!(events.is_empty());
        assert_eq!(objects.get(ObjectId(2)).unwrap().position, b_before);
        assert_eq!(objects.get(ObjectId(1)).unwrap().position, Some(Vec2::ZERO));
        assert_eq!(physics.space().coord_of(ObjectId(2)), Some(Coord::new(1, 0)));
        assert_eq!(physics.space().objects_at(Coord::new(0, 0)), &[ObjectId(1)]);
    }

    #[test]
    fn test_all_callbacks_run_and_passing_moves_commit() {
        let (mut physics, mut objects) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        physics.set_default_collision_callback(Arc::new(move |collision| {
            counter.fetch_add(1, Ordering::SeqCst);
            collision.emit(Event::sound("bump", None));
            CollisionOutcome::Pass
        }));
        spawn(&mut physics, &mut objects, 1, (0, 0));
        spawn(&mut physics, &mut objects, 2, (0, 0));
        spawn(&mut physics, &mut objects, 3, (1, 0));

        request(&mut physics, &mut objects, 3, (0, 0));
        let events = physics.update(&mut objects, 1);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(physics.space().coord_of(ObjectId(3)), Some(Coord::new(0, 0)));
        let sounds = events.iter().filter(|e| matches!(e.kind, EventKind::Sound { .. })).count();
        let moves = events.iter().filter(|e| matches!(e.kind, EventKind::PositionChange { .. })).count();
        assert_eq!((sounds, moves), (2, 1));
    }

    #[test]
    fn test_requests_judged_against_pre_update_state() {
        let (mut physics, mut objects) = setup();
        physics.set_default_collision_callback(Arc::new(|_| CollisionOutcome::Block));
        spawn(&mut physics, &mut objects, 1, (0, 0));
        spawn(&mut physics, &mut objects, 2, (1, 0));

        // 1 leaves (0,0) while 2 tries to enter it in the same tick.
        request(&mut physics, &mut objects, 1, (0, 5));
        request(&mut physics, &mut objects, 2, (0, 0));
        physics.update(&mut objects, 1);

        assert_eq!(physics.space().coord_of(ObjectId(1)), Some(Coord::new(0, 5)));
        assert_eq!(physics.space().coord_of(ObjectId(2)), Some(Coord::new(1, 0)));
    }

    #[test]
    fn test_last_request_wins_and_completion_reports() {
        let (mut physics, mut objects) = setup();
        spawn(&mut physics, &mut objects, 1, (0, 0));
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        request(&mut physics, &mut objects, 1, (3, 3));
        let seen = outcomes.clone();
        let target = physics.coord_to_vec(Coord::new(4, 4));
        physics.update_position(
            objects.get_mut(ObjectId(1)).unwrap(),
            Some(target),
            false,
            Some(Box::new(move |id, ok| {
                seen.lock().unwrap().push((id, ok));
                Vec::new()
            })),
            0,
        );
        assert_eq!(physics.pending_len(), 1);

        physics.update(&mut objects, 1);
        assert_eq!(physics.space().coord_of(ObjectId(1)), Some(Coord::new(4, 4)));
        assert_eq!(*outcomes.lock().unwrap(), vec![(ObjectId(1), true)]);
    }

    #[test]
    fn test_skip_collision_applies_immediately() {
        let (mut physics, mut objects) = setup();
        physics.set_default_collision_callback(Arc::new(|_| CollisionOutcome::Block));
        spawn(&mut physics, &mut objects, 1, (0, 0));
        spawn(&mut physics, &mut objects, 2, (2, 0));

        let obj = objects.get_mut(ObjectId(2)).unwrap();
        let events = physics.update_position(obj, Some(Vec2::ZERO), true, None, 3);
        assert_eq!(events.len(), 1);
        assert_eq!(physics.space().objects_at(Coord::new(0, 0)).len(), 2);

        let obj = objects.get_mut(ObjectId(2)).unwrap();
        physics.update_position(obj, None, true, None, 4);
        assert!(!physics.space().contains(ObjectId(2)));
        assert!(objects.get(ObjectId(2)).unwrap().position.is_none());
    }

    #[test]
    fn test_disabled_mover_is_not_moved() {
        let (mut physics, mut objects) = setup();
        spawn(&mut physics, &mut objects, 1, (0, 0));
        request(&mut physics, &mut objects, 1, (2, 2));
        objects.get_mut(ObjectId(1)).unwrap().enabled = false;

        physics.update(&mut objects, 1);
        assert_eq!(objects.get(ObjectId(1)).unwrap().position, Some(Vec2::ZERO));
    }

    proptest! {
        #[test]
        fn test_disjoint_moves_all_land(
            starts in proptest::collection::btree_set((-20i64..20, -20i64..20), 1..12),
            shift in 50i64..60,
        ) {
            let (mut physics, mut objects) = setup();
            physics.set_default_collision_callback(Arc::new(|_| CollisionOutcome::Block));
            let starts: Vec<(i64, i64)> = starts.into_iter().collect();
            for (i, cell) in starts.iter().enumerate() {
                spawn(&mut physics, &mut objects, i as u64 + 1, *cell);
            }
            // Destinations are disjoint from each other and from every start.
            let targets: BTreeSet<(i64, i64)> = starts.iter().map(|(x, y)| (x + shift, *y)).collect();
            for (i, cell) in starts.iter().enumerate() {
                request(&mut physics, &mut objects, i as u64 + 1, (cell.0 + shift, cell.1));
            }
            physics.update(&mut objects, 1);

            for (i, cell) in starts.iter().enumerate() {
                let id = ObjectId(i as u64 + 1);
                let expected = Coord::new(cell.0 + shift, cell.1);
                prop_assert_eq!(physics.space().coord_of(id), Some(expected));
                let position = objects.get(id).unwrap().position.unwrap();
                prop_assert_eq!(physics.vec_to_coord(position), expected);
            }
            prop_assert_eq!(physics.space().len(), targets.len());
            prop_assert!(physics.space.is_consistent());
        }
    }
}
