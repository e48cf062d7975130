// netwatch-event: Event data model
// Decoded kernel networking events and the ingestion-side contract

pub mod event;
pub mod ifname;
pub mod payload;
pub mod severity;
pub mod source;

pub use event::{epoch_ns, Event, EventType};
pub use ifname::{IfName, IfNameError};
pub use payload::{
    AddrInfo, ConntrackInfo, LinkInfo, NeighInfo, Payload, RouteInfo, SockInfo,
    VendorWirelessInfo, WirelessInfo,
};
pub use severity::Severity;
pub use source::{EventSource, ReplaySource};
