//! Bounded histories
//!
//! Fixed-capacity ring buffers used by the network layer: round-trip latency
//! samples per client, and timestamped snapshot / server-info logs on the
//! client for interpolation.

use std::collections::VecDeque;

use super::ids::Tick;

/// Rolling window of latency samples (seconds).
#[derive(Clone, Debug)]
pub struct LatencyLog {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl LatencyLog {
    /// Create a log holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), samples: VecDeque::with_capacity(capacity.max(1)) }
    }

    /// Record a sample, evicting the oldest once full.
    pub fn record(&mut self, latency: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Mean of the retained samples, or 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample was recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Entries bordering a timestamp: the newest strictly before it and the
/// oldest at or after it.
#[derive(Debug)]
pub struct Bordering<'a, T> {
    /// Newest entry with timestamp `< t`.
    pub prev: Option<(Tick, &'a T)>,
    /// Oldest entry with timestamp `>= t`.
    pub next: Option<(Tick, &'a T)>,
}

/// Fixed-capacity log of timestamped items.
#[derive(Clone, Debug)]
pub struct TimedHistory<T> {
    capacity: usize,
    entries: VecDeque<(Tick, T)>,
}

impl<T> TimedHistory<T> {
    /// Create a history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new() }
    }

    /// Append an entry, evicting the oldest once full.
    pub fn add(&mut self, timestamp: Tick, item: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((timestamp, item));
    }

    /// Most recently added entry.
    pub fn latest(&self) -> Option<(Tick, &T)> {
        self.entries.back().map(|(t, item)| (*t, item))
    }

    /// Entries bordering `timestamp`.
    ///
    /// When several entries share a timestamp the most recently added wins.
    pub fn bordering(&self, timestamp: Tick) -> Bordering<'_, T> {
        let mut prev: Option<(Tick, &T)> = None;
        let mut next: Option<(Tick, &T)> = None;
        for (t, item) in &self.entries {
            if *t < timestamp {
                if prev.map_or(true, |(p, _)| *t >= p) {
                    prev = Some((*t, item));
                }
            } else if next.map_or(true, |(n, _)| *t <= n) {
                next = Some((*t, item));
            }
        }
        Bordering { prev, next }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_log_rolls_over() {
        let mut log = LatencyLog::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0] {
            log.record(sample);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.average(), 3.0);
        assert_eq!(log.latest(), Some(4.0));
        assert_eq!(LatencyLog::new(5).average(), 0.0);
    }

    #[test]
    fn test_bordering_entries() {
        let mut history = TimedHistory::new(10);
        history.add(10, "a");
        history.add(20, "b");
        history.add(30, "c");

        let pair = history.bordering(20);
        assert_eq!(pair.prev, Some((10, &"a")));
        assert_eq!(pair.next, Some((20, &"b")));

        let pair = history.bordering(25);
        assert_eq!(pair.prev, Some((20, &"b")));
        assert_eq!(pair.next, Some((30, &"c")));

        let pair = history.bordering(99);
        assert_eq!(pair.prev, Some((30, &"c")));
        assert!(pair.next.is_none());
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = TimedHistory::new(2);
        history.add(1, 'x');
        history.add(2, 'y');
        history.add(3, 'z');
        assert_eq!(history.len(), 2);
        assert!(history.bordering(2).prev.is_none());
        assert_eq!(history.latest(), Some((3, &'z')));
    }
}
