//! Event Bus
//!
//! Pending events keyed by id. The bus assigns ids to events added with an
//! unassigned (zero) id, so every event on it is uniquely addressable.
//! Draining and dispatch live in the context; the bus is plain storage.

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::ids::{EventId, IdGenerator, Tick};
use crate::game::events::{Event, EventKind};

/// Store of pending events.
#[derive(Debug, Default)]
pub struct EventBus {
    events: BTreeMap<EventId, Event>,
    ids: IdGenerator,
}

impl EventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id (if unassigned) and a creation time (if unset).
    pub fn stamp(&mut self, event: &mut Event, tick: Tick) {
        if event.id == EventId(0) {
            event.id = self.ids.next_event();
        } else {
            self.ids.observe(event.id.get());
        }
        if event.creation_time == 0 {
            event.creation_time = tick;
        }
    }

    /// Fresh id without adding anything.
    pub fn next_id(&mut self) -> EventId {
        self.ids.next_event()
    }

    /// Add an event, replacing any event with the same id.
    pub fn add(&mut self, mut event: Event) -> EventId {
        if event.id == EventId(0) {
            event.id = self.ids.next_event();
        } else {
            self.ids.observe(event.id.get());
        }
        let id = event.id;
        self.events.insert(id, event);
        id
    }

    /// Add several events.
    pub fn add_all(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.add(event);
        }
    }

    /// Remove by id. Removing a missing id returns `None`.
    pub fn remove(&mut self, id: EventId) -> Option<Event> {
        self.events.remove(&id)
    }

    /// Event by id.
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id)
    }

    /// Mutable event by id.
    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(&id)
    }

    /// Drop every event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Remove and return every event, in id order.
    pub fn take_all(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events).into_values().collect()
    }

    /// Remove and return every event matching `pred`, in id order.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&Event) -> bool) -> Vec<Event> {
        let ids: Vec<EventId> = self
            .events
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter_map(|id| self.events.remove(&id)).collect()
    }

    /// Events in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events a client forwards to the server: pending input events.
    pub fn client_snapshot(&self) -> Vec<Event> {
        self.events
            .values()
            .filter(|e| matches!(e.kind, EventKind::Input { .. }))
            .cloned()
            .collect()
    }

    /// Every serializable pending event (persisted snapshots).
    pub fn snapshot(&self) -> Vec<Event> {
        self.events
            .values()
            .filter(|e| e.kind.is_serializable())
            .cloned()
            .collect()
    }

    /// Merge received events: known ids are overwritten, new ids are added.
    pub fn load_snapshot(&mut self, events: Vec<Event>) {
        for event in events {
            if self.events.contains_key(&event.id) {
                debug!(event_id = %event.id, "Overwriting pending event from snapshot");
            }
            self.add(event);
        }
    }
}
