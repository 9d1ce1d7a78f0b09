//! Core primitives.
//!
//! Leaf types shared by the simulation and the network layer: identifiers,
//! the tick clock, the 2D vector, tagged JSON helpers and bounded histories.

pub mod ids;
pub mod clock;
pub mod vec2;
pub mod tagged;
pub mod history;

// Re-export core types
pub use ids::{Tick, ObjectId, EventId, PlayerId, ClientId, IdGenerator};
pub use clock::{Clock, ClockMode};
pub use vec2::Vec2;
pub use history::{LatencyLog, TimedHistory};
