// netwatch-event: Protocol-tagged event payloads
// One small fixed record per netlink family; exactly one payload per event

use crate::ifname::IfName;
use serde::{Deserialize, Serialize};

/// Link (RTM_*LINK) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Kernel interface index
    pub ifindex: i32,
    /// IFF_* flag bits
    pub flags: u32,
    pub mtu: u32,
    pub mac: [u8; 6],
    pub qdisc: String,
    /// RFC 2863 operational state code
    pub operstate: u8,
    pub ifname: IfName,
}

/// Address (RTM_*ADDR) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddrInfo {
    /// AF_INET / AF_INET6
    pub family: u8,
    /// Textual address, decoder-formatted
    pub address: String,
    pub prefixlen: u8,
    pub scope: u8,
    pub ifindex: i32,
}

/// Route (RTM_*ROUTE) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub family: u8,
    /// Destination prefix; empty for the default route
    pub dst: String,
    pub dst_len: u8,
    pub gateway: String,
    /// Output interface index
    pub oif: i32,
    pub table: u32,
    /// RTPROT_* origin code
    pub protocol: u8,
}

impl RouteInfo {
    /// True for a default route (zero-length destination prefix)
    pub fn is_default(&self) -> bool {
        self.dst_len == 0
    }
}

/// Neighbor (RTM_*NEIGH) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighInfo {
    pub family: u8,
    /// Neighbor address
    pub dst: String,
    /// Link-layer address, decoder-formatted
    pub lladdr: String,
    /// NUD_* state bits
    pub state: u16,
    pub ifindex: i32,
}

/// Socket diagnostics (sock_diag) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SockInfo {
    pub family: u8,
    pub protocol: u8,
    pub src_addr: String,
    pub src_port: u16,
    pub dst_addr: String,
    pub dst_port: u16,
    /// TCP state code where applicable
    pub state: u8,
    pub inode: u64,
}

/// Connection tracking (nf_conntrack) payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConntrackInfo {
    pub proto: u8,
    pub src: String,
    pub dst: String,
    pub src_port: u16,
    pub dst_port: u16,
    /// Conntrack state label (e.g. "ESTABLISHED")
    pub state: String,
}

/// Wireless extension event payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirelessInfo {
    pub essid: String,
    pub signal_dbm: i32,
    pub freq_mhz: u32,
}

/// Vendor-specific wireless event payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorWirelessInfo {
    pub driver: String,
    pub code: u32,
    pub data: Vec<u8>,
}

/// Protocol-tagged payload carried by an event
///
/// Tree-shaped and exclusively owned: no payload holds a reference back
/// into the pipeline, so dropping the event drops the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Link(LinkInfo),
    Address(AddrInfo),
    Route(RouteInfo),
    Neighbor(NeighInfo),
    SocketDiag(SockInfo),
    Conntrack(ConntrackInfo),
    Wireless(WirelessInfo),
    VendorWireless(VendorWirelessInfo),
    /// Undecoded message bytes
    Generic(Vec<u8>),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Generic(Vec::new())
    }
}

impl Payload {
    /// Short family label for log lines
    pub fn family_name(&self) -> &'static str {
        match self {
            Payload::Link(_) => "link",
            Payload::Address(_) => "addr",
            Payload::Route(_) => "route",
            Payload::Neighbor(_) => "neigh",
            Payload::SocketDiag(_) => "sock",
            Payload::Conntrack(_) => "conntrack",
            Payload::Wireless(_) => "wireless",
            Payload::VendorWireless(_) => "vendor-wireless",
            Payload::Generic(_) => "generic",
        }
    }

    pub fn as_link(&self) -> Option<&LinkInfo> {
        match self {
            Payload::Link(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_addr(&self) -> Option<&AddrInfo> {
        match self {
            Payload::Address(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_route(&self) -> Option<&RouteInfo> {
        match self {
            Payload::Route(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_neigh(&self) -> Option<&NeighInfo> {
        match self {
            Payload::Neighbor(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_sock(&self) -> Option<&SockInfo> {
        match self {
            Payload::SocketDiag(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_conntrack(&self) -> Option<&ConntrackInfo> {
        match self {
            Payload::Conntrack(info) => Some(info),
            _ => None,
        }
    }
}
