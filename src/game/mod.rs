//! Simulation Module
//!
//! Everything that runs inside one tick. Iteration over objects, players
//! and events is in id order (BTreeMap) so that a tick is reproducible for a
//! given event sequence.
//!
//! ## Module Structure
//!
//! - `grid`: Spatial index of object ids by grid cell
//! - `shape`: Collision geometry and collision types
//! - `trigger`: Actions and the trigger interceptors that may veto them
//! - `object`: Game objects and their snapshot envelope
//! - `objects`: Object table with change tracking
//! - `registry`: Type name to constructor map for snapshot decoding
//! - `events`: Event records and payload kinds
//! - `event_bus`: Pending event store
//! - `player`: Players, cameras, player table
//! - `physics`: Buffered moves resolved against the grid
//! - `content`: Game rules interface
//! - `world`: Owner of all simulation state
//! - `snapshot`: Full and delta snapshots, persisted snapshot files
//! - `context`: Per-tick pipeline and the server side of synchronization

pub mod grid;
pub mod shape;
pub mod trigger;
pub mod object;
pub mod objects;
pub mod registry;
pub mod events;
pub mod event_bus;
pub mod player;
pub mod physics;
pub mod content;
pub mod world;
pub mod snapshot;
pub mod context;

// Re-export key types
pub use grid::{Coord, GridSpace};
pub use shape::{Shape, ShapeGroup, CollisionType};
pub use trigger::{Action, ActionArgs, TriggerSet, Verdict};
pub use object::{GameObject, ObjectError, ObjectSnapshot};
pub use objects::ObjectManager;
pub use registry::ObjectRegistry;
pub use events::{Event, EventKind, ObjectOp};
pub use event_bus::EventBus;
pub use player::{Camera, Player, PlayerManager};
pub use physics::{PhysicsConfig, PhysicsEngine, Collision, CollisionOutcome};
pub use content::{Content, ContentError, StepInfo};
pub use world::{GameConfig, World};
pub use snapshot::{Snapshot, SnapshotError};
pub use context::GameContext;
