//! Protocol Messages
//!
//! Wire format of the snapshot synchronization protocol. Every message is
//! JSON, then compressed and chunked by [`crate::network::codec`].
//!
//! ```text
//! client -> server   {info: RequestInfo, items: [[Event...]...]}
//! server -> client   {info: ResponseInfo, snapshot: Snapshot}
//! ```

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::ids::{ClientId, PlayerId, Tick};
use crate::game::events::Event;
use crate::game::snapshot::Snapshot;

/// Message tag of a regular sync exchange.
pub const MESSAGE_UPDATE: &str = "UPDATE";

fn default_message() -> String {
    MESSAGE_UPDATE.to_string()
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Request header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Client id; empty asks the server to assign one
    #[serde(default)]
    pub client_id: ClientId,
    /// Free-form client metadata
    #[serde(default)]
    pub meta: Value,
    /// Timestamps of snapshots received since the previous request
    #[serde(default)]
    pub snapshots_received: Vec<Tick>,
    /// Role requested for a new player
    #[serde(default)]
    pub player_type: u32,
    /// Player is driven by a person
    #[serde(default = "default_true")]
    pub is_human: bool,
    /// Message tag
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_true() -> bool {
    true
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            client_id: ClientId::default(),
            meta: Value::Null,
            snapshots_received: Vec::new(),
            player_type: 0,
            is_human: true,
            message: default_message(),
        }
    }
}

/// A client request: header plus batches of locally produced events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Header
    pub info: RequestInfo,
    /// Event batches, oldest first
    #[serde(default)]
    pub items: Vec<Vec<Event>>,
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Response header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// Server tick when the response was built
    pub server_tick: Tick,
    /// Server game time (seconds)
    pub server_time: f64,
    /// Message tag
    pub message: String,
    /// Client id (as assigned when the request had none)
    pub client_id: ClientId,
    /// Player owned by the client
    pub player_id: Option<PlayerId>,
    /// Timestamp of the enclosed snapshot, to acknowledge next request
    pub snapshot_timestamp: Tick,
}

/// Server response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    /// Header
    pub info: ResponseInfo,
    /// Delta snapshot
    pub snapshot: Snapshot,
}

// =============================================================================
// TESTS
// =============================================================================
