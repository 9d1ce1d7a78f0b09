//! Content Interface
//!
//! Game rules plug into the core through this trait. The core owns the
//! world and hands it to content on every call, so content never holds
//! references into the simulation.

use serde_json::Value;

use crate::config::ConfigError;
use crate::core::ids::{ClientId, PlayerId};
use crate::game::events::Event;
use crate::game::object::ObjectError;
use crate::game::player::Player;
use crate::game::snapshot::SnapshotError;
use crate::game::world::World;

/// Errors raised by content at load / reset time.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Content could not be loaded
    #[error("Failed to load content: {0}")]
    Load(String),

    /// Configuration entry referenced by content is missing or invalid
    #[error("Invalid content configuration: {0}")]
    Config(#[from] ConfigError),

    /// An object referenced during setup is missing
    #[error("Object error: {0}")]
    Object(#[from] ObjectError),

    /// A type referenced during setup is not registered
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Per-player step result, as consumed by agent wrappers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepInfo {
    /// Observation for the player
    pub observation: Value,
    /// Reward earned this step
    pub reward: f64,
    /// Episode finished
    pub done: bool,
    /// Extra diagnostics
    pub info: Value,
    /// Step should not be reported to the agent
    pub skip: bool,
}

/// Game content collaborator.
pub trait Content: Send {
    /// Load content: register object types, collision callbacks, initial
    /// state. Runs once at startup.
    fn load(&mut self, world: &mut World, client_only: bool) -> Result<(), ContentError>;

    /// Reset to the start of an episode.
    fn reset(&mut self, world: &mut World) -> Result<(), ContentError>;

    /// Per-tick content update, after physics.
    fn update(&mut self, world: &mut World);

    /// Events to inject before event processing.
    fn pre_event(&mut self, _world: &mut World) -> Vec<Event> {
        Vec::new()
    }

    /// Handle a player input event.
    fn process_input_event(&mut self, world: &mut World, event: &Event) -> Vec<Event>;

    /// Handle an admin / console command.
    fn process_admin_command_event(&mut self, _world: &mut World, _event: &Event) -> Vec<Event> {
        Vec::new()
    }

    /// Handle a content-defined event.
    fn process_event(&mut self, _world: &mut World, _event: &Event) -> Vec<Event> {
        Vec::new()
    }

    /// React to a committed position change (sector loading, ...).
    fn process_position_change_event(&mut self, _world: &mut World, _event: &Event) {}

    /// Create and register a player for a newly seen client.
    fn new_player(
        &mut self,
        world: &mut World,
        client_id: &ClientId,
        player_type: u32,
        is_human: bool,
    ) -> Result<PlayerId, ContentError>;

    /// Observation, reward and termination for `player`.
    fn step_info(&self, _world: &World, _player: &Player) -> StepInfo {
        StepInfo::default()
    }
}
