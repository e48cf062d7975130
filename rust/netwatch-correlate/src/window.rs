// netwatch-correlate: Time window
// Ordered, capacity- and age-bounded collection of recent events

use netwatch_event::Event;
use std::collections::VecDeque;

/// Sliding window over recent events
///
/// Entries are `(timestamp, owned event copy)` in insertion order;
/// timestamps are expected non-decreasing but not strictly monotonic.
/// Every add and query first evicts entries older than the window, and
/// an insert at capacity drops the oldest entry.
#[derive(Debug)]
pub struct TimeWindow {
    entries: VecDeque<(u64, Event)>,
    capacity: usize,
    window_ns: u64,
    dropped_capacity: u64,
    expired: u64,
}

impl TimeWindow {
    pub fn new(capacity: usize, window_sec: u64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            window_ns: window_sec.saturating_mul(1_000_000_000),
            dropped_capacity: 0,
            expired: 0,
        }
    }

    /// Insert an event, evicting aged and over-capacity entries
    pub fn add(&mut self, event: Event, now_ns: u64) {
        self.expire(now_ns);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped_capacity += 1;
        }
        self.entries.push_back((event.timestamp, event));
    }

    /// Drop entries older than `now - window`
    pub fn expire(&mut self, now_ns: u64) {
        while let Some((timestamp, _)) = self.entries.front() {
            if now_ns.saturating_sub(*timestamp) > self.window_ns {
                self.entries.pop_front();
                self.expired += 1;
            } else {
                break;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events currently in the window that satisfy `predicate`
    pub fn query<'a>(&'a self, predicate: impl Fn(&Event) -> bool) -> Vec<&'a Event> {
        self.entries
            .iter()
            .filter(|(_, event)| predicate(event))
            .map(|(_, event)| event)
            .collect()
    }

    /// Sequences of every event in the window, oldest first
    pub fn sequences(&self) -> Vec<u64> {
        self.entries.iter().map(|(_, event)| event.sequence).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn dropped_capacity(&self) -> u64 {
        self.dropped_capacity
    }

    pub fn expired(&self) -> u64 {
        self.expired
    }
}
