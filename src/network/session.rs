//! Remote Client Sessions
//!
//! Server-side bookkeeping for one connected client: which snapshot it last
//! acknowledged, which snapshots are still in flight, its latency history,
//! and the client-relevant events queued for its next snapshot.
//!
//! ## Acknowledgement state machine
//!
//! ```text
//! Fresh (cutoff 0) --ack T--> Synchronized (cutoff T)
//!        ^                          |
//!        +---- unconfirmed > max ---+   (Overloaded: reset to fresh)
//! ```

use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::core::history::LatencyLog;
use crate::core::ids::{ClientId, PlayerId, Tick};
use crate::game::events::Event;

/// Server-side latency samples kept per client.
pub const SERVER_LATENCY_HISTORY: usize = 100;

/// Server-side state of one remote client.
#[derive(Debug)]
pub struct RemoteClient {
    /// Client identifier
    pub id: ClientId,
    /// Delta cutoff: the newest acknowledged snapshot timestamp (0 = fresh)
    pub last_snapshot_time: Tick,
    /// Rolling request-interval history (seconds)
    pub latency: LatencyLog,
    /// Player owned by this client
    pub player_id: Option<PlayerId>,
    /// Snapshot timestamps sent but not yet acknowledged
    pub unconfirmed: BTreeSet<Tick>,
    /// Number of requests handled
    pub request_counter: u64,
    outgoing_events: Vec<Event>,
    last_request_at: Option<Instant>,
}

impl RemoteClient {
    /// Fresh session.
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            last_snapshot_time: 0,
            latency: LatencyLog::new(SERVER_LATENCY_HISTORY),
            player_id: None,
            unconfirmed: BTreeSet::new(),
            request_counter: 0,
            outgoing_events: Vec::new(),
            last_request_at: None,
        }
    }

    /// Record an incoming request, sampling the interval since the last one.
    pub fn record_request(&mut self, now: Instant) {
        if let Some(previous) = self.last_request_at {
            self.latency.record(now.duration_since(previous).as_secs_f64());
        }
        self.last_request_at = Some(now);
        self.request_counter += 1;
    }

    /// Apply the client's acknowledgement list.
    ///
    /// An empty list means the client holds no state and resets the cutoff
    /// to 0. Otherwise every acknowledged timestamp still in flight leaves
    /// the unconfirmed set and the cutoff advances to the newest of them.
    pub fn acknowledge(&mut self, snapshots_received: &[Tick]) {
        if snapshots_received.is_empty() {
            self.last_snapshot_time = 0;
            return;
        }
        for ts in snapshots_received {
            if self.unconfirmed.remove(ts) {
                self.last_snapshot_time = self.last_snapshot_time.max(*ts);
            }
        }
    }

    /// Force the client back to fresh when too many snapshots are in
    /// flight. Returns true when the reset happened.
    pub fn check_backpressure(&mut self, max_unconfirmed: usize) -> bool {
        if self.unconfirmed.len() <= max_unconfirmed {
            return false;
        }
        warn!(
            client_id = %self.id,
            unconfirmed = self.unconfirmed.len(),
            max_unconfirmed,
            "Client stopped acknowledging, resending full state"
        );
        self.last_snapshot_time = 0;
        self.unconfirmed.clear();
        true
    }

    /// Note a snapshot as sent.
    pub fn record_sent(&mut self, timestamp: Tick) {
        self.unconfirmed.insert(timestamp);
        debug!(client_id = %self.id, timestamp, in_flight = self.unconfirmed.len(), "Snapshot sent");
    }

    /// Queue a client-relevant event for the next snapshot.
    pub fn add_event(&mut self, event: Event) {
        self.outgoing_events.push(event);
    }

    /// Drain the queued events.
    pub fn pull_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outgoing_events)
    }

    /// Number of queued events.
    pub fn pending_events(&self) -> usize {
        self.outgoing_events.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
