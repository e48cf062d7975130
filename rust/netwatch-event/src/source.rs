// netwatch-event: Ingestion-side contract
// A source maps kernel messages into decoded events; the pipeline pulls

use crate::event::Event;

/// Ingestion source contract
///
/// At most one producer feeds a processor's ring at a time, so a source
/// is driven from a single thread. The source owns decoding: it maps
/// kernel messages into the tagged payload variants and must not keep
/// mutable access to payload bytes once an event has been handed over.
pub trait EventSource {
    /// Pull the next decoded event, `None` when the source is drained
    /// or disconnected. Reconnection is the source's concern; the core
    /// simply resumes pulling when the source yields events again.
    fn next_event(&mut self) -> Option<Event>;

    /// Source label for logs
    fn name(&self) -> &str {
        "event-source"
    }
}

/// In-memory source that replays a fixed batch of events
///
/// Used by tests and wiring demos in place of a kernel subscription.
#[derive(Debug, Default)]
pub struct ReplaySource {
    events: std::collections::VecDeque<Event>,
}

impl ReplaySource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ReplaySource {
    fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn name(&self) -> &str {
        "replay"
    }
}
