// End-to-end pipeline scenarios: submission through ring, workers and
// rule engines, with counters checked at every stage

use netwatch::{Event, EventType, IfName, Monitor, MonitorConfig, Payload, RuleRecord, Severity};
use netwatch::config::CorrelationSettings;
use netwatch::event::LinkInfo;
use netwatch::pipeline::{EventProcessor, ProcessorConfig};
use netwatch::rules::ActionSpec;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SEC: u64 = 1_000_000_000;

fn link_event(ifname: &str, message_type: u16) -> Event {
    Event::new(
        message_type,
        IfName::new(ifname).unwrap(),
        Payload::Link(LinkInfo::default()),
    )
}

fn log_rule(name: &str, condition: &str, dir: &tempfile::TempDir) -> RuleRecord {
    RuleRecord {
        name: name.to_string(),
        condition: condition.to_string(),
        enabled: true,
        action: ActionSpec::Log {
            path: dir
                .path()
                .join(format!("{}.log", name))
                .to_str()
                .unwrap()
                .to_string(),
            append: true,
        },
        rate_limit: None,
        suppress_sec: 0,
        severity: Severity::Info,
        sync: true,
    }
}

#[test]
fn test_simple_match_counts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    config
        .hooks
        .push(log_rule("eth0-match", "interface == \"eth0\"", &dir));

    let monitor = Monitor::new(config).unwrap();
    assert!(monitor.submit(&link_event("eth0", 16)));
    assert!(monitor.submit(&link_event("eth1", 16)));
    monitor.wait();

    let stats = monitor.stats();
    assert_eq!(stats.hook_evals, 2);
    assert_eq!(stats.hook_matches, 1);

    let hook = monitor.hooks().stats("eth0-match").unwrap();
    assert_eq!(hook.executed, 1);
}

#[test]
fn test_short_circuit_and_exactly_one_match() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    config.hooks.push(log_rule(
        "and-rule",
        "interface == \"eth0\" AND message_type == 16",
        &dir,
    ));

    let monitor = Monitor::new(config).unwrap();
    for (ifname, message_type) in [("eth0", 16), ("eth0", 17), ("eth1", 16), ("eth1", 17)] {
        monitor.submit(&link_event(ifname, message_type));
    }
    monitor.wait();

    assert_eq!(monitor.stats().hook_matches, 1);
}

#[test]
fn test_regex_and_in_list() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    config.hooks.push(log_rule(
        "regex-in",
        "interface =~ \"eth.*\" AND message_type IN [16, 17]",
        &dir,
    ));

    let monitor = Monitor::new(config).unwrap();
    for (ifname, message_type) in [("eth0", 16), ("eth9", 17), ("eth0", 18), ("wlan0", 16)] {
        monitor.submit(&link_event(ifname, message_type));
    }
    monitor.wait();

    assert_eq!(monitor.stats().hook_matches, 2);
}

#[test]
fn test_rule_rate_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    let mut rule = log_rule("limited", "interface == \"eth0\"", &dir);
    rule.rate_limit = Some(netwatch::rules::RateLimitSpec {
        count: 2,
        window_sec: 60,
    });
    config.hooks.push(rule);

    let monitor = Monitor::new(config).unwrap();
    for _ in 0..5 {
        monitor.submit(&link_event("eth0", 16));
    }
    monitor.wait();

    let hook = monitor.hooks().stats("limited").unwrap();
    assert_eq!(hook.triggered, 5);
    assert_eq!(hook.executed, 2);
    assert_eq!(hook.rate_limited, 3);
}

#[test]
fn test_ring_overflow_drops_and_preserves_order() {
    let processor = EventProcessor::new(ProcessorConfig {
        ring_capacity: 4,
        workers: 1,
        max_pending: 64,
        pool_capacity: 16,
        global_rate: None,
        per_type_rate: None,
    })
    .unwrap();

    // The first event parks the only worker on a gate
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let gate = Arc::clone(&gate);
        let seen = Arc::clone(&seen);
        processor.register_handler(Arc::new(move |event: &Event| {
            seen.lock().push(event.sequence);
            let (lock, cv) = &*gate;
            let mut open = lock.lock();
            while !*open {
                cv.wait(&mut open);
            }
        }));
    }

    assert!(processor.submit(&link_event("eth0", 16)));
    // Let the worker dequeue the gate event so the ring starts empty
    std::thread::sleep(std::time::Duration::from_millis(50));

    let mut accepted = 0;
    for _ in 0..8 {
        if processor.submit(&link_event("eth0", 16)) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 4);
    assert_eq!(processor.stats().dropped_full, 4);

    {
        let (lock, cv) = &*gate;
        *lock.lock() = true;
        cv.notify_all();
    }
    processor.wait();

    // Gate event plus the four accepted, in submission order
    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    let stats = processor.stats();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.workers.pending, 0);
    assert_eq!(stats.workers.active, 0);
}

#[test]
fn test_exec_timeout_leaves_pipeline_alive() {
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 2;
    config.hooks.push(RuleRecord {
        name: "slow-script".to_string(),
        condition: "interface == \"eth0\"".to_string(),
        enabled: true,
        action: ActionSpec::Exec {
            script: "sleep 10".to_string(),
            timeout_ms: 100,
            capture: false,
        },
        rate_limit: None,
        suppress_sec: 0,
        severity: Severity::Warning,
        sync: true,
    });

    let monitor = Monitor::new(config).unwrap();
    monitor.submit(&link_event("eth0", 16));
    monitor.wait();

    let hook = monitor.hooks().stats("slow-script").unwrap();
    assert_eq!(hook.timeouts, 1);

    // The processor is unaffected and still accepts work
    assert!(monitor.submit(&link_event("eth1", 16)));
    monitor.wait();
    assert_eq!(monitor.stats().processor.processed, 2);
}

#[test]
fn test_correlation_groups_end_to_end() {
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    config.correlations.push(CorrelationSettings {
        name: "flap".to_string(),
        conditions: vec!["interface == \"eth0\"".to_string()],
        time_window_sec: 5,
        event_count: 3,
    });

    let monitor = Monitor::new(config).unwrap();

    // Three matches inside the window
    for sec in [1u64, 2, 3] {
        let mut event = link_event("eth0", 16);
        event.timestamp = sec * SEC;
        monitor.submit(&event);
    }
    monitor.wait();

    let results = monitor.correlation_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "flap-1");

    // Two more spread over the next window: expiry re-arms and the
    // refilled window emits the second group
    for sec in [7u64, 9] {
        let mut event = link_event("eth0", 16);
        event.timestamp = sec * SEC;
        monitor.submit(&event);
    }
    monitor.wait();

    let results = monitor.correlation_results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].id, "flap-2");
}

#[test]
fn test_alert_lifecycle_end_to_end() {
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    let dir = tempfile::tempdir().unwrap();
    let mut rule = log_rule("link-del", "event_type == 2", &dir);
    rule.severity = Severity::Critical;
    config.alerts.push(rule);

    let monitor = Monitor::new(config).unwrap();
    monitor.submit(&link_event("eth0", 17));
    monitor.wait();

    let active = monitor.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, Severity::Critical);

    monitor.alerts().acknowledge(active[0].id, "oncall").unwrap();
    monitor.alerts().resolve(active[0].id).unwrap();
    assert!(monitor.active_alerts().is_empty());
}

#[test]
fn test_security_findings_surface() {
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    config.security.suspicious_names = vec!["tap".to_string()];

    let monitor = Monitor::new(config).unwrap();
    monitor.submit(&link_event("tap0", 16));
    monitor.wait();

    let findings = monitor.security_findings();
    assert_eq!(findings.len(), 1);
}

#[test]
fn test_no_event_lost_on_graceful_shutdown() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 4;
    config.pipeline.ring_capacity = 8192;
    let monitor = Monitor::new(config).unwrap();

    {
        let seen = Arc::clone(&seen);
        monitor.processor().register_handler(Arc::new(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let mut accepted = 0;
    for _ in 0..1_000 {
        if monitor.submit(&link_event("eth0", 16)) {
            accepted += 1;
        }
    }
    monitor.shutdown(true);

    assert_eq!(seen.load(Ordering::SeqCst), accepted);

    // Invariant: after drain, nothing is pending or active
    let stats = monitor.stats();
    assert_eq!(stats.processor.workers.pending, 0);
    assert_eq!(stats.processor.workers.active, 0);
    assert_eq!(stats.processor.processed as usize, accepted);
}

#[test]
fn test_event_type_mapping_end_to_end() {
    let mut config = MonitorConfig::default();
    config.pipeline.workers = 1;
    let monitor = Monitor::new(config).unwrap();

    let event = link_event("eth0", 17);
    assert_eq!(event.event_type, EventType::LinkDel);
    monitor.submit(&event);
    monitor.wait();
    assert_eq!(monitor.stats().processor.processed, 1);
}
