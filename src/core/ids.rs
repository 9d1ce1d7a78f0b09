//! Identifiers
//!
//! Opaque, generator-assigned identifiers for objects, events, players and
//! remote clients. Numeric ids are ordered so the simulation can keep them in
//! `BTreeMap`s and iterate deterministically.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Simulation time unit: one discrete step.
pub type Tick = u64;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a game object.
    ObjectId
);

numeric_id!(
    /// Identifier of an event on the bus.
    EventId
);

numeric_id!(
    /// Identifier of a player record.
    PlayerId
);

/// Identifier of a connected client (uuid string on the wire).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Generate a fresh random client id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// True when the client has not been assigned an id yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String view.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Monotonic id source.
///
/// Ids start at 1 so that 0 never names a live entity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Create a generator whose first id is `start + 1`.
    pub fn starting_after(start: u64) -> Self {
        Self { last: start }
    }

    /// Next raw id.
    pub fn next_raw(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Next object id.
    pub fn next_object(&mut self) -> ObjectId {
        ObjectId(self.next_raw())
    }

    /// Next event id.
    pub fn next_event(&mut self) -> EventId {
        EventId(self.next_raw())
    }

    /// Next player id.
    pub fn next_player(&mut self) -> PlayerId {
        PlayerId(self.next_raw())
    }

    /// Make sure future ids are strictly greater than `seen`.
    ///
    /// Used after loading a snapshot so freshly generated ids never collide
    /// with loaded ones.
    pub fn observe(&mut self, seen: u64) {
        if seen > self.last {
            self.last = seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_monotonic() {
        let mut ids = IdGenerator::new();
        let a = ids.next_object();
        let b = ids.next_object();
        assert_eq!(a, ObjectId(1));
        assert!(b > a);
    }

    #[test]
    fn test_observe_skips_past_loaded_ids() {
        let mut ids = IdGenerator::new();
        ids.observe(41);
        assert_eq!(ids.next_event(), EventId(42));

        // Observing a smaller id never rewinds.
        ids.observe(3);
        assert_eq!(ids.next_event(), EventId(43));
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ObjectId(7)).unwrap();
        assert_eq!(json, "7");
        let client: ClientId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(client.as_str(), "abc");
    }
}
