// netwatch-correlate: Pattern frequency detector
// Per (event_type, interface) bucket statistics over a rolling window

use netwatch_event::Event;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const NS_PER_SEC: u64 = 1_000_000_000;

/// Detector thresholds
#[derive(Debug, Clone, Copy)]
pub struct PatternConfig {
    /// Bucket count required to emit a hit
    pub min_frequency: u64,
    pub window_sec: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_frequency: 10,
            window_sec: 60,
        }
    }
}

/// Emitted when a bucket crosses the frequency threshold
#[derive(Debug, Clone, Serialize)]
pub struct PatternHit {
    pub event_type: u32,
    pub interface: String,
    pub count: u64,
    pub events_per_sec: f64,
    pub first_seen: u64,
    pub last_seen: u64,
}

#[derive(Debug, Clone)]
struct Bucket {
    first_seen: u64,
    last_seen: u64,
    count: u64,
    /// One hit per bucket lifetime; reset with the bucket
    alerted: bool,
}

/// Pattern detector
///
/// Buckets reset when their window elapses (measured on event
/// timestamps), which also clears the alerted flag.
pub struct PatternDetector {
    config: PatternConfig,
    buckets: Mutex<HashMap<(u32, String), Bucket>>,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Account one event; returns a hit when its bucket crosses the
    /// threshold for the first time in this window
    pub fn process(&self, event: &Event) -> Option<PatternHit> {
        let key = (
            event.event_type.code(),
            event.interface.as_str().to_string(),
        );
        let now = event.timestamp;
        let window_ns = self.config.window_sec.saturating_mul(NS_PER_SEC);

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.clone()).or_insert(Bucket {
            first_seen: now,
            last_seen: now,
            count: 0,
            alerted: false,
        });

        if now.saturating_sub(bucket.first_seen) > window_ns {
            // Window elapsed: fresh bucket, alert can fire again
            *bucket = Bucket {
                first_seen: now,
                last_seen: now,
                count: 0,
                alerted: false,
            };
        }

        bucket.count += 1;
        bucket.last_seen = now;

        if bucket.alerted || bucket.count < self.config.min_frequency {
            return None;
        }
        bucket.alerted = true;

        let elapsed_sec =
            (bucket.last_seen.saturating_sub(bucket.first_seen)) as f64 / NS_PER_SEC as f64;
        let events_per_sec = bucket.count as f64 / elapsed_sec.max(1e-9);

        debug!(
            event_type = key.0,
            interface = %key.1,
            count = bucket.count,
            "pattern frequency threshold crossed"
        );

        Some(PatternHit {
            event_type: key.0,
            interface: key.1,
            count: bucket.count,
            events_per_sec,
            first_seen: bucket.first_seen,
            last_seen: bucket.last_seen,
        })
    }

    /// Distinct buckets currently tracked
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_event::{IfName, LinkInfo, Payload};

    fn event_at(sec: u64, ifname: &str) -> Event {
        let mut event = Event::new(
            16,
            IfName::new(ifname).unwrap(),
            Payload::Link(LinkInfo::default()),
        );
        event.timestamp = sec * NS_PER_SEC;
        event
    }

    #[test]
    fn test_hit_at_threshold_once() {
        let detector = PatternDetector::new(PatternConfig {
            min_frequency: 3,
            window_sec: 60,
        });

        assert!(detector.process(&event_at(1, "eth0")).is_none());
        assert!(detector.process(&event_at(2, "eth0")).is_none());

        let hit = detector.process(&event_at(3, "eth0")).unwrap();
        assert_eq!(hit.count, 3);
        assert_eq!(hit.interface, "eth0");
        assert!(hit.events_per_sec > 1.0);

        // Further events in the same window stay quiet
        assert!(detector.process(&event_at(4, "eth0")).is_none());
    }

    #[test]
    fn test_buckets_keyed_by_type_and_interface() {
        let detector = PatternDetector::new(PatternConfig {
            min_frequency: 2,
            window_sec: 60,
        });

        detector.process(&event_at(1, "eth0"));
        detector.process(&event_at(1, "wlan0"));
        assert_eq!(detector.bucket_count(), 2);

        // Each interface needs its own threshold crossing
        assert!(detector.process(&event_at(2, "eth0")).is_some());
        assert!(detector.process(&event_at(2, "wlan0")).is_some());
    }

    #[test]
    fn test_window_reset_rearms() {
        let detector = PatternDetector::new(PatternConfig {
            min_frequency: 2,
            window_sec: 10,
        });

        detector.process(&event_at(1, "eth0"));
        assert!(detector.process(&event_at(2, "eth0")).is_some());

        // Past the window the bucket resets and can alert again
        detector.process(&event_at(20, "eth0"));
        assert!(detector.process(&event_at(21, "eth0")).is_some());
    }

    #[test]
    fn test_slow_events_never_hit() {
        let detector = PatternDetector::new(PatternConfig {
            min_frequency: 3,
            window_sec: 5,
        });

        // Each event resets the window before the count builds up
        for sec in [0u64, 10, 20, 30] {
            assert!(detector.process(&event_at(sec, "eth0")).is_none());
        }
    }
}
