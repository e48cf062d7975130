// netwatch-filter: Expression AST and field identifiers

use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// Extended-regex match (`=~`)
    Match,
    /// Negated regex match (`!~`)
    NotMatch,
}

/// Enumerated event field referenced by an expression
///
/// Closed set: common header fields plus protocol-scoped fields that
/// only resolve when the event carries the matching payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FieldId {
    Interface = 0,
    MessageType = 1,
    EventType = 2,
    Namespace = 3,
    Timestamp = 4,
    Sequence = 5,

    LinkIfname = 10,
    LinkIfindex = 11,
    LinkFlags = 12,
    LinkMtu = 13,
    LinkOperstate = 14,
    LinkQdisc = 15,

    AddrFamily = 20,
    AddrAddress = 21,
    AddrPrefixlen = 22,
    AddrScope = 23,

    RouteFamily = 30,
    RouteDst = 31,
    RouteGateway = 32,
    RouteOif = 33,
    RouteTable = 34,
    RouteProtocol = 35,

    NeighFamily = 40,
    NeighDst = 41,
    NeighLladdr = 42,
    NeighState = 43,

    SockFamily = 50,
    SockProtocol = 51,
    SockSrcPort = 52,
    SockDstPort = 53,
    SockState = 54,

    CtProto = 60,
    CtSrc = 61,
    CtDst = 62,
    CtState = 63,

    /// Unrecognized field name; evaluates as a missing field
    Unknown = 999,
}

const FIELD_NAMES: &[(&str, FieldId)] = &[
    ("interface", FieldId::Interface),
    ("message_type", FieldId::MessageType),
    ("event_type", FieldId::EventType),
    ("namespace", FieldId::Namespace),
    ("timestamp", FieldId::Timestamp),
    ("sequence", FieldId::Sequence),
    ("nl.link.ifname", FieldId::LinkIfname),
    ("nl.link.ifindex", FieldId::LinkIfindex),
    ("nl.link.flags", FieldId::LinkFlags),
    ("nl.link.mtu", FieldId::LinkMtu),
    ("nl.link.operstate", FieldId::LinkOperstate),
    ("nl.link.qdisc", FieldId::LinkQdisc),
    ("nl.addr.family", FieldId::AddrFamily),
    ("nl.addr.address", FieldId::AddrAddress),
    ("nl.addr.prefixlen", FieldId::AddrPrefixlen),
    ("nl.addr.scope", FieldId::AddrScope),
    ("nl.route.family", FieldId::RouteFamily),
    ("nl.route.dst", FieldId::RouteDst),
    ("nl.route.gateway", FieldId::RouteGateway),
    ("nl.route.oif", FieldId::RouteOif),
    ("nl.route.table", FieldId::RouteTable),
    ("nl.route.protocol", FieldId::RouteProtocol),
    ("nl.neigh.family", FieldId::NeighFamily),
    ("nl.neigh.dst", FieldId::NeighDst),
    ("nl.neigh.lladdr", FieldId::NeighLladdr),
    ("nl.neigh.state", FieldId::NeighState),
    ("nl.sock.family", FieldId::SockFamily),
    ("nl.sock.protocol", FieldId::SockProtocol),
    ("nl.sock.src_port", FieldId::SockSrcPort),
    ("nl.sock.dst_port", FieldId::SockDstPort),
    ("nl.sock.state", FieldId::SockState),
    ("nl.ct.proto", FieldId::CtProto),
    ("nl.ct.src", FieldId::CtSrc),
    ("nl.ct.dst", FieldId::CtDst),
    ("nl.ct.state", FieldId::CtState),
];

impl FieldId {
    /// Resolve a field name; `None` for names outside the closed set
    pub fn from_name(name: &str) -> Option<Self> {
        FIELD_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, id)| *id)
    }

    pub fn name(self) -> &'static str {
        FIELD_NAMES
            .iter()
            .find(|(_, id)| *id == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Numeric code carried in bytecode operands
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Self {
        FIELD_NAMES
            .iter()
            .find(|(_, id)| id.code() == code)
            .map(|(_, id)| *id)
            .unwrap_or(FieldId::Unknown)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed filter expression
///
/// Binary nodes always have both children; `In`'s right side is always
/// a literal list. Both are enforced structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    In {
        lhs: Box<Expr>,
        list: Vec<Expr>,
    },
    Field(FieldId),
    Str(String),
    Int(i64),
}

impl Expr {
    /// True for literal leaves (no field access)
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Str(_) | Expr::Int(_))
    }
}
