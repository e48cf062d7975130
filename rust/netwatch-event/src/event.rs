// netwatch-event: Event record
// Unit of work for the pipeline: timestamp, sequence, type tags, one payload

use crate::ifname::IfName;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// Raw rtnetlink message type codes recognized by the tag mapping
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_NEWADDR: u16 = 20;
const RTM_DELADDR: u16 = 21;
const RTM_NEWROUTE: u16 = 24;
const RTM_DELROUTE: u16 = 25;
const RTM_NEWNEIGH: u16 = 28;
const RTM_DELNEIGH: u16 = 29;

/// Event type tag derived from the source message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventType {
    LinkNew = 1,
    LinkDel = 2,
    AddrNew = 3,
    AddrDel = 4,
    RouteNew = 5,
    RouteDel = 6,
    NeighNew = 7,
    NeighDel = 8,
    SockDiag = 9,
    ConntrackNew = 10,
    ConntrackDel = 11,
    Wireless = 12,
    VendorWireless = 13,
    Unknown = 0,
}

impl EventType {
    /// Integer tag used by the per-type rate limiter map and filters
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a raw rtnetlink message type onto a tag
    pub fn from_message_type(message_type: u16) -> Self {
        match message_type {
            RTM_NEWLINK => EventType::LinkNew,
            RTM_DELLINK => EventType::LinkDel,
            RTM_NEWADDR => EventType::AddrNew,
            RTM_DELADDR => EventType::AddrDel,
            RTM_NEWROUTE => EventType::RouteNew,
            RTM_DELROUTE => EventType::RouteDel,
            RTM_NEWNEIGH => EventType::NeighNew,
            RTM_DELNEIGH => EventType::NeighDel,
            _ => EventType::Unknown,
        }
    }

    /// Short label for log lines
    pub fn name(self) -> &'static str {
        match self {
            EventType::LinkNew => "link-new",
            EventType::LinkDel => "link-del",
            EventType::AddrNew => "addr-new",
            EventType::AddrDel => "addr-del",
            EventType::RouteNew => "route-new",
            EventType::RouteDel => "route-del",
            EventType::NeighNew => "neigh-new",
            EventType::NeighDel => "neigh-del",
            EventType::SockDiag => "sock-diag",
            EventType::ConntrackNew => "conntrack-new",
            EventType::ConntrackDel => "conntrack-del",
            EventType::Wireless => "wireless",
            EventType::VendorWireless => "vendor-wireless",
            EventType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nanoseconds since the Unix epoch
pub fn epoch_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// One decoded kernel networking state change
///
/// Exclusively owned by whoever holds it: the decoder hands ownership to
/// the processor, the processor to the ring, the ring to the worker that
/// dequeues it. Handlers receive a shared borrow for the duration of one
/// call and must copy anything they keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Nanoseconds since epoch, stamped at decode time
    pub timestamp: u64,
    /// Per-processor monotonic counter, assigned on submit
    pub sequence: u64,
    pub event_type: EventType,
    /// Raw source message subtype
    pub message_type: u16,
    pub interface: IfName,
    /// Network namespace name, when the source runs namespaced
    pub namespace: Option<String>,
    pub payload: Payload,
}

impl Event {
    /// Build an event stamped with the current time
    pub fn new(message_type: u16, interface: IfName, payload: Payload) -> Self {
        Self {
            timestamp: epoch_ns(),
            sequence: 0,
            event_type: EventType::from_message_type(message_type),
            message_type,
            interface,
            namespace: None,
            payload,
        }
    }

    /// Override the derived event type (sock/conntrack/wireless channels
    /// carry their own subtype spaces)
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Namespace as seen by filters: empty string when absent
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// Reset in place for pool reuse
    pub fn reset(&mut self) {
        self.timestamp = 0;
        self.sequence = 0;
        self.event_type = EventType::Unknown;
        self.message_type = 0;
        self.interface = IfName::empty();
        self.namespace = None;
        self.payload = Payload::default();
    }

    /// One-line summary for log sinks
    pub fn summary(&self) -> String {
        format!(
            "seq={} type={} msg={} if={}",
            self.sequence,
            self.event_type.name(),
            self.message_type,
            self.interface
        )
    }
}

impl Default for Event {
    fn default() -> Self {
        Self {
            timestamp: 0,
            sequence: 0,
            event_type: EventType::Unknown,
            message_type: 0,
            interface: IfName::empty(),
            namespace: None,
            payload: Payload::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::LinkInfo;

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(EventType::from_message_type(16), EventType::LinkNew);
        assert_eq!(EventType::from_message_type(17), EventType::LinkDel);
        assert_eq!(EventType::from_message_type(24), EventType::RouteNew);
        assert_eq!(EventType::from_message_type(29), EventType::NeighDel);
        assert_eq!(EventType::from_message_type(999), EventType::Unknown);
    }

    #[test]
    fn test_event_creation() {
        let event = Event::new(
            16,
            IfName::new("eth0").unwrap(),
            Payload::Link(LinkInfo::default()),
        );

        assert_eq!(event.event_type, EventType::LinkNew);
        assert_eq!(event.message_type, 16);
        assert!(event.timestamp > 0);
        assert_eq!(event.sequence, 0);
        assert_eq!(event.namespace_str(), "");
    }

    #[test]
    fn test_event_reset() {
        let mut event = Event::new(
            16,
            IfName::new("eth0").unwrap(),
            Payload::Link(LinkInfo::default()),
        )
        .with_namespace("blue");
        event.sequence = 42;

        event.reset();
        assert_eq!(event.sequence, 0);
        assert_eq!(event.event_type, EventType::Unknown);
        assert!(event.interface.is_empty());
        assert!(event.namespace.is_none());
        assert_eq!(event.payload, Payload::Generic(Vec::new()));
    }

    #[test]
    fn test_event_summary() {
        let mut event = Event::new(
            16,
            IfName::new("eth0").unwrap(),
            Payload::Link(LinkInfo::default()),
        );
        event.sequence = 7;

        let line = event.summary();
        assert!(line.contains("seq=7"));
        assert!(line.contains("type=link-new"));
        assert!(line.contains("if=eth0"));
    }

    #[test]
    fn test_timestamps_monotonic_origin() {
        let a = epoch_ns();
        let b = epoch_ns();
        assert!(b >= a);
    }
}
