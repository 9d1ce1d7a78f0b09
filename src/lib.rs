//! # Tessera Server
//!
//! Tick-based authoritative simulation of objects on a 2D grid, with
//! snapshot synchronization between a server and its clients over UDP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TESSERA SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Leaf primitives                           │
//! │  ├── ids.rs      - Object / event / player / client ids      │
//! │  ├── clock.rs    - Fixed-rate or uncapped tick clock         │
//! │  ├── vec2.rs     - 2D vector with tagged JSON form           │
//! │  └── history.rs  - Latency log, timestamped history          │
//! │                                                              │
//! │  game/           - Simulation                                │
//! │  ├── grid.rs     - Cell -> object id index                   │
//! │  ├── physics.rs  - Buffered, collision-checked moves         │
//! │  ├── object.rs   - Objects, actions, triggers                │
//! │  ├── event_bus.rs- Pending events                            │
//! │  ├── world.rs    - Owner of all simulation state             │
//! │  ├── snapshot.rs - Full / delta snapshots                    │
//! │  └── context.rs  - Per-tick pipeline                         │
//! │                                                              │
//! │  network/        - Synchronization (async, tokio)            │
//! │  ├── codec.rs    - JSON + LZ4 + datagram chunking            │
//! │  ├── server.rs   - UDP server task, simulation bridge        │
//! │  ├── session.rs  - Per-client acknowledgement state          │
//! │  └── client.rs   - Connector, client-side reconciliation     │
//! │                                                              │
//! │  config.rs       - GameDef, TESSERA_* environment overrides  │
//! │  runner.rs       - Paced tick loop                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Pipeline
//!
//! ```text
//! pre-event -> events (to fixed point) -> physics -> content update -> tick
//! ```
//!
//! The simulation is single-threaded and owns all state. Network tasks talk
//! to it only through bounded channels carrying owned messages, so nothing
//! in `game/` is shared or locked.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod config;
pub mod runner;

// Re-export commonly used types
pub use crate::core::{Clock, ClockMode, Tick, ObjectId, EventId, PlayerId, ClientId, Vec2};
pub use crate::game::{Content, ContentError, Event, EventKind, GameContext, GameObject, World};
pub use crate::config::{GameDef, ConfigError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 60;
