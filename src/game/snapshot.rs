//! Snapshots
//!
//! Point-in-time captures of the simulation:
//!
//! - **delta**: objects changed at or after a cutoff, all players, and the
//!   client's queued events. Sent to remote clients.
//! - **full**: every object, all players, all serializable pending events,
//!   plus game time. Written to disk by save/load commands.
//!
//! Loading merges into the live world: known objects are overwritten in
//! place, unknown ones are rebuilt through the type registry. An object with
//! an unregistered type is logged and skipped.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::core::ids::{ClientId, PlayerId, Tick};
use crate::game::events::Event;
use crate::game::object::ObjectSnapshot;
use crate::game::player::Player;
use crate::game::world::World;

/// Snapshot errors.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Type tag has no registered constructor
    #[error("Unknown object type: {0}")]
    UnknownType(String),

    /// Object payload carries no id
    #[error("Object snapshot has no id")]
    MissingId,

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a snapshot file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialized simulation state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Objects
    #[serde(default)]
    pub om: Vec<ObjectSnapshot>,
    /// Players
    #[serde(default)]
    pub pm: BTreeMap<PlayerId, Player>,
    /// Events
    #[serde(default)]
    pub em: Vec<Event>,
    /// Tick the snapshot was taken at
    pub timestamp: Tick,
    /// Game time in seconds (full snapshots only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gametime: Option<f64>,
}

impl World {
    /// Delta snapshot for a remote client: objects changed since the
    /// client's cutoff, all players, and the client's queued events.
    ///
    /// Does not touch acknowledgement bookkeeping.
    pub fn create_snapshot_for_client(&mut self, client_id: &ClientId) -> Snapshot {
        let timestamp = self.clock.ticks();
        let client = self.remote_client(client_id);
        let cutoff = client.last_snapshot_time;
        let em = client.pull_events();
        Snapshot {
            om: self.objects.snapshot_since(cutoff),
            pm: self.players.snapshot(),
            em,
            timestamp,
            gametime: None,
        }
    }

    /// Full snapshot of the world.
    pub fn create_full_snapshot(&self) -> Snapshot {
        Snapshot {
            om: self.objects.snapshot_full(),
            pm: self.players.snapshot(),
            em: self.bus.snapshot(),
            timestamp: self.clock.ticks(),
            gametime: Some(self.clock.game_time()),
        }
    }

    /// Merge a snapshot into the world.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        for data in &snapshot.om {
            self.load_object_snapshot(data);
        }
        for id in self.players.load_snapshot(snapshot.pm) {
            self.observe_player_id(id);
        }
        self.bus.load_snapshot(snapshot.em);
    }

    fn load_object_snapshot(&mut self, data: &ObjectSnapshot) {
        let Some(id) = data.object_id() else {
            warn!(type_name = %data.type_name, "Skipping object snapshot without id");
            return;
        };

        if let Some(existing) = self.objects.get(id) {
            let mut obj = existing.clone();
            if let Err(e) = obj.load_snapshot(data) {
                warn!(object_id = %id, error = %e, "Skipping malformed object snapshot");
                return;
            }
            self.physics.sync_object(&obj);
            self.objects.insert(obj);
            return;
        }

        match self.registry.create_from_snapshot(data) {
            Ok(obj) => {
                self.observe_object_id(id);
                self.physics.sync_object(&obj);
                self.objects.insert(obj);
            }
            Err(e) => {
                warn!(object_id = %id, error = %e, "Skipping object snapshot");
            }
        }
    }

    /// Write a full snapshot to `path` as JSON.
    pub fn save_snapshot_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let snapshot = self.create_full_snapshot();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &snapshot)?;
        info!(path = %path.display(), objects = snapshot.om.len(), "Saved snapshot");
        Ok(())
    }

    /// Load a full snapshot from `path`, restoring tick and game time.
    pub fn load_snapshot_file(&mut self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        self.clock.set_ticks(snapshot.timestamp);
        if let Some(game_time) = snapshot.gametime {
            self.clock.rebase(game_time);
        }
        self.objects.set_tick(snapshot.timestamp);
        info!(path = %path.display(), objects = snapshot.om.len(), "Loaded snapshot");
        self.load_snapshot(snapshot);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
