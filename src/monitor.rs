// netwatch: Monitor glue
// Builds the pipeline from configuration, compiles rules, registers the
// engine handlers and drives ingestion sources

use crate::config::MonitorConfig;
use anyhow::{Context, Result};
use netwatch_correlate::{
    CorrelationEngine, CorrelationResult, CorrelationRule, PatternConfig, PatternDetector,
    PatternHit, SecurityConfig, SecurityDetector, SecurityFinding,
};
use netwatch_event::{Event, EventSource};
use netwatch_pipeline::{EventProcessor, ProcessorConfig, ProcessorStats, RateSpec};
use netwatch_rules::{AlertEngine, AlertInstance, HookEngine};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Retained correlation/pattern/security outputs per category
const OUTPUT_RING_CAPACITY: usize = 512;

/// Aggregate monitor counters
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub processor: ProcessorStats,
    /// Condition evaluations and matches across hook rules
    pub hook_evals: u64,
    pub hook_matches: u64,
    pub alert_evals: u64,
    pub alert_matches: u64,
    pub correlation_results: u64,
    pub pattern_hits: u64,
    pub security_findings: u64,
}

struct OutputRing<T> {
    items: Mutex<VecDeque<T>>,
    total: std::sync::atomic::AtomicU64,
}

impl<T: Clone> OutputRing<T> {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(OUTPUT_RING_CAPACITY)),
            total: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn push(&self, item: T) {
        self.total
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut items = self.items.lock();
        if items.len() == OUTPUT_RING_CAPACITY {
            items.pop_front();
        }
        items.push_back(item);
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }

    fn total(&self) -> u64 {
        self.total.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// The assembled monitoring pipeline
///
/// Owns the processor and every engine; engines are registered as
/// processor handlers in a fixed order (hooks, alerts, correlation,
/// patterns, security) so each event visits them predictably.
pub struct Monitor {
    processor: Arc<EventProcessor>,
    hooks: Arc<HookEngine>,
    alerts: Arc<AlertEngine>,
    correlations: Arc<CorrelationEngine>,
    correlation_out: Arc<OutputRing<CorrelationResult>>,
    pattern_out: Arc<OutputRing<PatternHit>>,
    security_out: Arc<OutputRing<SecurityFinding>>,
}

impl Monitor {
    /// Build the pipeline and install every configured rule
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let processor = EventProcessor::new(ProcessorConfig {
            ring_capacity: config.pipeline.ring_capacity,
            workers: config.pipeline.workers,
            max_pending: config.pipeline.max_pending,
            pool_capacity: config.pipeline.pool_capacity,
            global_rate: config.pipeline.global_rate.map(|r| RateSpec {
                rate: r.rate,
                burst: r.burst,
            }),
            per_type_rate: config.pipeline.per_type_rate.map(|r| RateSpec {
                rate: r.rate,
                burst: r.burst,
            }),
        })
        .context("creating event processor")?;

        let hooks = Arc::new(HookEngine::new(
            config.engines.hook_capacity,
            config.engines.hook_max_concurrent,
        ));
        for record in &config.hooks {
            hooks
                .add_rule(record)
                .with_context(|| format!("installing hook '{}'", record.name))?;
        }

        let alerts = Arc::new(AlertEngine::new(
            config.engines.alert_capacity,
            config.engines.alert_history,
            config.engines.alert_max_concurrent,
        ));
        for record in &config.alerts {
            alerts
                .add_rule(record)
                .with_context(|| format!("installing alert '{}'", record.name))?;
        }

        let correlations = Arc::new(CorrelationEngine::new(
            config.engines.correlation_window_capacity,
        ));
        for settings in &config.correlations {
            correlations
                .add_rule(CorrelationRule {
                    name: settings.name.clone(),
                    conditions: settings.conditions.clone(),
                    time_window_sec: settings.time_window_sec,
                    event_count: settings.event_count,
                })
                .with_context(|| format!("installing correlation '{}'", settings.name))?;
        }

        let patterns = Arc::new(PatternDetector::new(PatternConfig {
            min_frequency: config.pattern.min_frequency,
            window_sec: config.pattern.window_sec,
        }));
        let security = Arc::new(SecurityDetector::new(SecurityConfig {
            neigh_flood_threshold: config.security.neigh_flood_threshold,
            neigh_flood_window_sec: config.security.neigh_flood_window_sec,
            storm_threshold: config.security.storm_threshold,
            storm_window_sec: config.security.storm_window_sec,
            suspicious_names: config.security.suspicious_names.clone(),
        }));

        let correlation_out = Arc::new(OutputRing::new());
        let pattern_out = Arc::new(OutputRing::new());
        let security_out = Arc::new(OutputRing::new());

        {
            let hooks = Arc::clone(&hooks);
            processor.register_handler(Arc::new(move |event: &Event| {
                hooks.on_event(event);
            }));
        }
        {
            let alerts = Arc::clone(&alerts);
            processor.register_handler(Arc::new(move |event: &Event| {
                alerts.on_event(event);
            }));
        }
        {
            let correlations = Arc::clone(&correlations);
            let out = Arc::clone(&correlation_out);
            processor.register_handler(Arc::new(move |event: &Event| {
                for result in correlations.process(event) {
                    info!(id = %result.id, rule = %result.rule, "correlation emitted");
                    out.push(result);
                }
            }));
        }
        {
            let patterns = Arc::clone(&patterns);
            let out = Arc::clone(&pattern_out);
            processor.register_handler(Arc::new(move |event: &Event| {
                if let Some(hit) = patterns.process(event) {
                    info!(
                        interface = %hit.interface,
                        count = hit.count,
                        "pattern frequency hit"
                    );
                    out.push(hit);
                }
            }));
        }
        {
            let security = Arc::clone(&security);
            let out = Arc::clone(&security_out);
            processor.register_handler(Arc::new(move |event: &Event| {
                for finding in security.process(event) {
                    out.push(finding);
                }
            }));
        }

        debug!(
            hooks = config.hooks.len(),
            alerts = config.alerts.len(),
            correlations = config.correlations.len(),
            "monitor assembled"
        );

        Ok(Self {
            processor,
            hooks,
            alerts,
            correlations,
            correlation_out,
            pattern_out,
            security_out,
        })
    }

    /// Submit one event; `false` when refused (rate limit / full ring)
    pub fn submit(&self, event: &Event) -> bool {
        self.processor.submit(event)
    }

    /// Pull a source dry, submitting everything it yields; returns
    /// (submitted, refused)
    pub fn attach(&self, source: &mut dyn EventSource) -> (u64, u64) {
        let mut submitted = 0;
        let mut refused = 0;
        while let Some(event) = source.next_event() {
            if self.submit(&event) {
                submitted += 1;
            } else {
                refused += 1;
            }
        }
        debug!(source = source.name(), submitted, refused, "source drained");
        (submitted, refused)
    }

    /// Block until every accepted event has been processed
    pub fn wait(&self) {
        self.processor.wait();
        self.hooks.wait_actions();
        self.alerts.wait_actions();
    }

    /// Stop the pipeline; `wait` selects drain vs. discard
    pub fn shutdown(&self, wait: bool) {
        self.processor.shutdown(wait);
    }

    pub fn processor(&self) -> &Arc<EventProcessor> {
        &self.processor
    }

    pub fn hooks(&self) -> &Arc<HookEngine> {
        &self.hooks
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn correlations(&self) -> &Arc<CorrelationEngine> {
        &self.correlations
    }

    /// Recent correlation results, oldest first
    pub fn correlation_results(&self) -> Vec<CorrelationResult> {
        self.correlation_out.snapshot()
    }

    pub fn pattern_hits(&self) -> Vec<PatternHit> {
        self.pattern_out.snapshot()
    }

    pub fn security_findings(&self) -> Vec<SecurityFinding> {
        self.security_out.snapshot()
    }

    /// Active alert instances
    pub fn active_alerts(&self) -> Vec<AlertInstance> {
        self.alerts.active()
    }

    /// Aggregate counter snapshot
    pub fn stats(&self) -> MonitorStats {
        let (hook_evals, hook_matches) = self.hooks.eval_counters();
        let (alert_evals, alert_matches) = self.alerts.eval_counters();
        MonitorStats {
            processor: self.processor.stats(),
            hook_evals,
            hook_matches,
            alert_evals,
            alert_matches,
            correlation_results: self.correlation_out.total(),
            pattern_hits: self.pattern_out.total(),
            security_findings: self.security_out.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_event::{IfName, LinkInfo, Payload, ReplaySource};

    fn link_event(ifname: &str) -> Event {
        Event::new(
            16,
            IfName::new(ifname).unwrap(),
            Payload::Link(LinkInfo::default()),
        )
    }

    #[test]
    fn test_monitor_builds_from_defaults() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        assert!(monitor.submit(&link_event("eth0")));
        monitor.wait();
        assert_eq!(monitor.stats().processor.processed, 1);
    }

    #[test]
    fn test_attach_drains_source() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let mut source = ReplaySource::new(
            (0..10).map(|_| link_event("eth0")).collect(),
        );

        let (submitted, refused) = monitor.attach(&mut source);
        monitor.wait();

        assert_eq!(submitted, 10);
        assert_eq!(refused, 0);
        assert_eq!(source.remaining(), 0);
        assert_eq!(monitor.stats().processor.processed, 10);
    }

    #[test]
    fn test_bad_rule_fails_construction() {
        let mut config = MonitorConfig::default();
        config.hooks.push(netwatch_rules::RuleRecord {
            name: "broken".to_string(),
            condition: "interface ==".to_string(),
            enabled: true,
            action: netwatch_rules::ActionSpec::Log {
                path: "/tmp/x.log".to_string(),
                append: true,
            },
            rate_limit: None,
            suppress_sec: 0,
            severity: netwatch_event::Severity::Info,
            sync: true,
        });

        assert!(Monitor::new(config).is_err());
    }
}
