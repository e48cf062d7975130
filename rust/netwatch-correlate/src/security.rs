// netwatch-correlate: Security heuristics
// Small independent detectors over the event stream; each keeps its own
// state behind its own mutex, and none gates the others

use netwatch_event::{Event, EventType};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

const NS_PER_SEC: u64 = 1_000_000_000;

/// IFF_PROMISC from the kernel's interface flag set
const IFF_PROMISC: u32 = 0x100;

/// Detector thresholds and denylist
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Neighbor events within the window that count as a flood
    pub neigh_flood_threshold: usize,
    pub neigh_flood_window_sec: u64,
    /// Per-interface events within the window that count as a storm
    pub storm_threshold: u64,
    pub storm_window_sec: u64,
    /// Substrings flagged in interface names
    pub suspicious_names: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            neigh_flood_threshold: 50,
            neigh_flood_window_sec: 10,
            storm_threshold: 100,
            storm_window_sec: 10,
            suspicious_names: vec!["tap".to_string(), "tun".to_string(), "mon".to_string()],
        }
    }
}

/// One detector firing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SecurityFinding {
    PromiscuousMode {
        interface: String,
    },
    NeighborFlood {
        count: usize,
        window_sec: u64,
    },
    InterfaceStorm {
        interface: String,
        count: u64,
        window_sec: u64,
    },
    RouteHijack {
        table: u32,
        old_gateway: String,
        new_gateway: String,
    },
    SuspiciousInterface {
        interface: String,
        matched: String,
    },
}

#[derive(Debug, Default)]
struct StormBucket {
    window_start: u64,
    count: u64,
}

/// Stateful security detector
pub struct SecurityDetector {
    config: SecurityConfig,
    /// Interfaces currently flagged promiscuous
    promiscuous: Mutex<HashSet<String>>,
    /// Recent neighbor event timestamps
    neigh_times: Mutex<VecDeque<u64>>,
    storms: Mutex<HashMap<String, StormBucket>>,
    /// Default-route gateway per routing table
    default_gateways: Mutex<HashMap<u32, String>>,
    flagged_names: Mutex<HashSet<String>>,
}

impl SecurityDetector {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            promiscuous: Mutex::new(HashSet::new()),
            neigh_times: Mutex::new(VecDeque::new()),
            storms: Mutex::new(HashMap::new()),
            default_gateways: Mutex::new(HashMap::new()),
            flagged_names: Mutex::new(HashSet::new()),
        }
    }

    /// Run every heuristic against the event
    pub fn process(&self, event: &Event) -> Vec<SecurityFinding> {
        let mut findings = Vec::new();

        if let Some(finding) = self.check_promiscuous(event) {
            findings.push(finding);
        }
        if let Some(finding) = self.check_neighbor_flood(event) {
            findings.push(finding);
        }
        if let Some(finding) = self.check_interface_storm(event) {
            findings.push(finding);
        }
        if let Some(finding) = self.check_route_hijack(event) {
            findings.push(finding);
        }
        if let Some(finding) = self.check_suspicious_name(event) {
            findings.push(finding);
        }

        for finding in &findings {
            warn!(?finding, "security heuristic fired");
        }
        findings
    }

    /// Flag set on link flags; one finding per transition into
    /// promiscuous mode
    fn check_promiscuous(&self, event: &Event) -> Option<SecurityFinding> {
        let link = event.payload.as_link()?;
        let name = event.interface.as_str().to_string();
        let mut flagged = self.promiscuous.lock();

        if link.flags & IFF_PROMISC != 0 {
            if flagged.insert(name.clone()) {
                return Some(SecurityFinding::PromiscuousMode { interface: name });
            }
        } else {
            flagged.remove(&name);
        }
        None
    }

    /// Sliding window over neighbor events; resets after firing so the
    /// next flood is reported once
    fn check_neighbor_flood(&self, event: &Event) -> Option<SecurityFinding> {
        if !matches!(
            event.event_type,
            EventType::NeighNew | EventType::NeighDel
        ) {
            return None;
        }
        let window_ns = self.config.neigh_flood_window_sec * NS_PER_SEC;
        let now = event.timestamp;

        let mut times = self.neigh_times.lock();
        times.push_back(now);
        while let Some(oldest) = times.front() {
            if now.saturating_sub(*oldest) > window_ns {
                times.pop_front();
            } else {
                break;
            }
        }

        if times.len() >= self.config.neigh_flood_threshold {
            let count = times.len();
            times.clear();
            return Some(SecurityFinding::NeighborFlood {
                count,
                window_sec: self.config.neigh_flood_window_sec,
            });
        }
        None
    }

    /// Per-interface counter reset every window
    fn check_interface_storm(&self, event: &Event) -> Option<SecurityFinding> {
        if event.interface.is_empty() {
            return None;
        }
        let window_ns = self.config.storm_window_sec * NS_PER_SEC;
        let now = event.timestamp;
        let name = event.interface.as_str().to_string();

        let mut storms = self.storms.lock();
        let bucket = storms.entry(name.clone()).or_insert(StormBucket {
            window_start: now,
            count: 0,
        });
        if now.saturating_sub(bucket.window_start) > window_ns {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;

        if bucket.count == self.config.storm_threshold {
            return Some(SecurityFinding::InterfaceStorm {
                interface: name,
                count: bucket.count,
                window_sec: self.config.storm_window_sec,
            });
        }
        None
    }

    /// Default-route gateway change: the first default route per table
    /// is remembered, a different gateway later fires
    fn check_route_hijack(&self, event: &Event) -> Option<SecurityFinding> {
        if event.event_type != EventType::RouteNew {
            return None;
        }
        let route = event.payload.as_route()?;
        if !route.is_default() || route.gateway.is_empty() {
            return None;
        }

        let mut gateways = self.default_gateways.lock();
        match gateways.get(&route.table) {
            None => {
                gateways.insert(route.table, route.gateway.clone());
                None
            }
            Some(known) if *known == route.gateway => None,
            Some(known) => {
                let finding = SecurityFinding::RouteHijack {
                    table: route.table,
                    old_gateway: known.clone(),
                    new_gateway: route.gateway.clone(),
                };
                gateways.insert(route.table, route.gateway.clone());
                Some(finding)
            }
        }
    }

    /// Substring match against the configured denylist, once per name
    fn check_suspicious_name(&self, event: &Event) -> Option<SecurityFinding> {
        if event.interface.is_empty() {
            return None;
        }
        let name = event.interface.as_str();
        let matched = self
            .config
            .suspicious_names
            .iter()
            .find(|pattern| name.contains(pattern.as_str()))?
            .clone();

        let mut flagged = self.flagged_names.lock();
        if flagged.insert(name.to_string()) {
            return Some(SecurityFinding::SuspiciousInterface {
                interface: name.to_string(),
                matched,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_event::{IfName, LinkInfo, NeighInfo, Payload, RouteInfo};

    fn base_event(ifname: &str, message_type: u16, payload: Payload) -> Event {
        Event::new(message_type, IfName::new(ifname).unwrap(), payload)
    }

    fn detector() -> SecurityDetector {
        SecurityDetector::new(SecurityConfig {
            neigh_flood_threshold: 3,
            neigh_flood_window_sec: 10,
            storm_threshold: 4,
            storm_window_sec: 10,
            suspicious_names: vec!["tap".to_string()],
        })
    }

    #[test]
    fn test_promiscuous_mode_fires_once_per_transition() {
        let detector = detector();
        let promisc = base_event(
            "eth0",
            16,
            Payload::Link(LinkInfo {
                flags: IFF_PROMISC,
                ..Default::default()
            }),
        );

        let findings = detector.process(&promisc);
        assert!(findings
            .iter()
            .any(|f| matches!(f, SecurityFinding::PromiscuousMode { .. })));

        // Repeat while still promiscuous stays quiet
        assert!(detector
            .process(&promisc)
            .iter()
            .all(|f| !matches!(f, SecurityFinding::PromiscuousMode { .. })));

        // Clearing and re-entering fires again
        let normal = base_event("eth0", 16, Payload::Link(LinkInfo::default()));
        detector.process(&normal);
        assert!(detector
            .process(&promisc)
            .iter()
            .any(|f| matches!(f, SecurityFinding::PromiscuousMode { .. })));
    }

    #[test]
    fn test_neighbor_flood_threshold() {
        let detector = detector();
        let mut fired = 0;
        for i in 0..3u64 {
            let mut event = base_event("eth0", 28, Payload::Neighbor(NeighInfo::default()));
            event.timestamp = i * NS_PER_SEC;
            fired += detector
                .process(&event)
                .iter()
                .filter(|f| matches!(f, SecurityFinding::NeighborFlood { .. }))
                .count();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_slow_neighbor_events_no_flood() {
        let detector = detector();
        for i in 0..5u64 {
            let mut event = base_event("eth0", 28, Payload::Neighbor(NeighInfo::default()));
            // 20 s apart, outside the 10 s window
            event.timestamp = i * 20 * NS_PER_SEC;
            assert!(detector
                .process(&event)
                .iter()
                .all(|f| !matches!(f, SecurityFinding::NeighborFlood { .. })));
        }
    }

    #[test]
    fn test_interface_storm() {
        let detector = detector();
        let mut storm_findings = 0;
        for i in 0..6u64 {
            let mut event = base_event("eth1", 16, Payload::Link(LinkInfo::default()));
            event.timestamp = i * NS_PER_SEC;
            storm_findings += detector
                .process(&event)
                .iter()
                .filter(|f| matches!(f, SecurityFinding::InterfaceStorm { .. }))
                .count();
        }
        // Fires exactly once when the counter crosses the threshold
        assert_eq!(storm_findings, 1);
    }

    #[test]
    fn test_route_hijack_on_default_gateway_change() {
        let detector = detector();
        let route = |gateway: &str| {
            base_event(
                "eth0",
                24,
                Payload::Route(RouteInfo {
                    dst_len: 0,
                    gateway: gateway.to_string(),
                    table: 254,
                    ..Default::default()
                }),
            )
        };

        // First default route is remembered, not flagged
        assert!(detector.process(&route("192.168.1.1")).is_empty());
        // Same gateway again stays quiet
        assert!(detector.process(&route("192.168.1.1")).is_empty());

        let findings = detector.process(&route("10.13.37.1"));
        assert_eq!(
            findings,
            vec![SecurityFinding::RouteHijack {
                table: 254,
                old_gateway: "192.168.1.1".to_string(),
                new_gateway: "10.13.37.1".to_string(),
            }]
        );
    }

    #[test]
    fn test_non_default_routes_ignored_by_hijack() {
        let detector = detector();
        let event = base_event(
            "eth0",
            24,
            Payload::Route(RouteInfo {
                dst: "10.0.0.0".to_string(),
                dst_len: 8,
                gateway: "192.168.1.1".to_string(),
                table: 254,
                ..Default::default()
            }),
        );
        assert!(detector.process(&event).is_empty());
        assert!(detector.process(&event).is_empty());
    }

    #[test]
    fn test_suspicious_interface_name() {
        let detector = detector();
        let event = base_event("tap0", 16, Payload::Link(LinkInfo::default()));

        let findings = detector.process(&event);
        assert!(findings.iter().any(|f| matches!(
            f,
            SecurityFinding::SuspiciousInterface { interface, .. } if interface == "tap0"
        )));

        // Same name reported once
        assert!(detector
            .process(&event)
            .iter()
            .all(|f| !matches!(f, SecurityFinding::SuspiciousInterface { .. })));
    }

    #[test]
    fn test_detectors_do_not_gate_each_other() {
        let detector = detector();
        // Promiscuous tap interface: both heuristics fire on one event
        let event = base_event(
            "tap0",
            16,
            Payload::Link(LinkInfo {
                flags: IFF_PROMISC,
                ..Default::default()
            }),
        );
        let findings = detector.process(&event);
        assert!(findings
            .iter()
            .any(|f| matches!(f, SecurityFinding::PromiscuousMode { .. })));
        assert!(findings
            .iter()
            .any(|f| matches!(f, SecurityFinding::SuspiciousInterface { .. })));
    }
}
