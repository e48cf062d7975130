// netwatch-correlate: Correlation rules
// Groups of matching events within a time window emit deterministic ids

use crate::error::{CorrelateError, CorrelateResult};
use crate::window::TimeWindow;
use netwatch_event::Event;
use netwatch_filter::{CompiledFilter, EvalContext};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Correlation rule definition
#[derive(Debug, Clone)]
pub struct CorrelationRule {
    pub name: String,
    /// An event joins the window when it matches any condition; an
    /// empty list admits every event
    pub conditions: Vec<String>,
    pub time_window_sec: u64,
    /// Window population required to emit a result
    pub event_count: usize,
}

/// Emitted grouping
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationResult {
    /// Deterministic `"<rule>-<n>"`, `n` strictly monotonic per rule
    pub id: String,
    pub rule: String,
    /// Sequences of the grouped events, oldest first
    pub sequences: Vec<u64>,
    /// Timestamp of the event that completed the group
    pub emitted_at: u64,
}

struct RuleEntry {
    name: String,
    conditions: Vec<CompiledFilter>,
    event_count: usize,
    window: Mutex<TimeWindow>,
    /// Re-armed when expiry takes the window back below the threshold,
    /// so a standing-full window emits once rather than per event
    armed: Mutex<bool>,
    counter: AtomicU64,
}

/// Correlation engine
///
/// Expiry is driven by event timestamps, which keeps result ids
/// deterministic for a given rule set and submission order.
pub struct CorrelationEngine {
    rules: RwLock<Vec<Arc<RuleEntry>>>,
    ctx: Mutex<EvalContext>,
    window_capacity: usize,
}

impl CorrelationEngine {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            ctx: Mutex::new(EvalContext::new()),
            window_capacity: window_capacity.max(1),
        }
    }

    pub fn add_rule(&self, rule: CorrelationRule) -> CorrelateResult<()> {
        if rule.event_count == 0 {
            return Err(CorrelateError::InvalidRule(format!(
                "rule '{}': event_count must be non-zero",
                rule.name
            )));
        }
        if rule.time_window_sec == 0 {
            return Err(CorrelateError::InvalidRule(format!(
                "rule '{}': time_window_sec must be non-zero",
                rule.name
            )));
        }

        let mut conditions = Vec::with_capacity(rule.conditions.len());
        for condition in &rule.conditions {
            conditions.push(CompiledFilter::new(condition)?);
        }

        let mut rules = self.rules.write();
        if rules.iter().any(|entry| entry.name == rule.name) {
            return Err(CorrelateError::DuplicateRule(rule.name));
        }

        debug!(rule = %rule.name, window_sec = rule.time_window_sec, "correlation rule installed");
        rules.push(Arc::new(RuleEntry {
            name: rule.name,
            conditions,
            event_count: rule.event_count,
            window: Mutex::new(TimeWindow::new(self.window_capacity, rule.time_window_sec)),
            armed: Mutex::new(true),
            counter: AtomicU64::new(0),
        }));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> CorrelateResult<()> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|entry| entry.name != name);
        if rules.len() == before {
            return Err(CorrelateError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Feed one event through every rule; returns the groupings it
    /// completed
    pub fn process(&self, event: &Event) -> Vec<CorrelationResult> {
        let entries: Vec<Arc<RuleEntry>> = self.rules.read().iter().cloned().collect();
        let mut results = Vec::new();

        for entry in entries {
            let matched = if entry.conditions.is_empty() {
                true
            } else {
                let mut ctx = self.ctx.lock();
                entry
                    .conditions
                    .iter()
                    .any(|condition| condition.matches(&mut ctx, event))
            };

            let now = event.timestamp;
            let mut window = entry.window.lock();
            let mut armed = entry.armed.lock();

            // Re-arm before the add: expiry taking the window below the
            // threshold is what permits the next emission
            window.expire(now);
            if window.count() < entry.event_count {
                *armed = true;
            }

            if !matched {
                continue;
            }
            window.add(event.clone(), now);

            if window.count() < entry.event_count || !*armed {
                continue;
            }
            *armed = false;

            let n = entry.counter.fetch_add(1, Ordering::Relaxed) + 1;
            results.push(CorrelationResult {
                id: format!("{}-{}", entry.name, n),
                rule: entry.name.clone(),
                sequences: window.sequences(),
                emitted_at: now,
            });
        }
        results
    }

    /// Results emitted so far for one rule
    pub fn emitted_count(&self, name: &str) -> Option<u64> {
        self.rules
            .read()
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.counter.load(Ordering::Relaxed))
    }
}
