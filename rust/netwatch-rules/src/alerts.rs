// netwatch-rules: Alert engine
// Hook-style evaluation plus severity, a state machine per instance and
// a bounded history ring

use crate::actions::{run_action, ActionOutcome, ActionStatus};
use crate::error::{RuleError, RuleResult};
use crate::gate::ConcurrencyGate;
use crate::rule::{Rule, RuleRecord};
use netwatch_event::{epoch_ns, Event, Severity};
use netwatch_filter::EvalContext;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Longest message stored on an instance
const MESSAGE_LIMIT: usize = 256;

/// Alert instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Acknowledged,
    Resolved,
    /// Triggered inside the rule's suppression window; no action fired
    Suppressed,
}

/// One triggered alert
///
/// References the originating event only by its sequence number; the
/// event itself is long gone by the time anyone reads the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: u64,
    pub rule: String,
    pub severity: Severity,
    pub state: AlertState,
    /// Epoch nanoseconds
    pub triggered_at: u64,
    pub acked_at: Option<u64>,
    pub resolved_at: Option<u64>,
    pub acked_by: Option<String>,
    /// Sequence of the originating event
    pub sequence: u64,
    pub message: String,
}

/// Per-rule alert counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStatsSnapshot {
    pub triggered: u64,
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub suppressed: u64,
    pub rate_limited: u64,
}

#[derive(Default)]
struct AlertStats {
    triggered: AtomicU64,
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    suppressed: AtomicU64,
    rate_limited: AtomicU64,
}

impl AlertStats {
    fn record_outcome(&self, outcome: &ActionOutcome) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        match outcome.status {
            ActionStatus::Success => self.succeeded.fetch_add(1, Ordering::Relaxed),
            ActionStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            ActionStatus::Timeout => self.timeouts.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> AlertStatsSnapshot {
        AlertStatsSnapshot {
            triggered: self.triggered.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

struct AlertEntry {
    rule: Rule,
    enabled: AtomicBool,
    triggers: Mutex<VecDeque<Instant>>,
    suppress_until: Mutex<Option<Instant>>,
    stats: AlertStats,
}

impl AlertEntry {
    fn admit(&self, now: Instant) -> bool {
        let Some(rate_limit) = self.rule.rate_limit else {
            return true;
        };
        let window = Duration::from_secs(rate_limit.window_sec);

        let mut triggers = self.triggers.lock();
        while let Some(oldest) = triggers.front() {
            if now.duration_since(*oldest) > window {
                triggers.pop_front();
            } else {
                break;
            }
        }
        if triggers.len() >= rate_limit.count as usize {
            return false;
        }
        triggers.push_back(now);
        true
    }
}

/// Alert engine
///
/// Locks: rules table under its own RwLock, history under its own
/// mutex, counters atomic. Actions run outside both body locks on a
/// snapshotted entry.
pub struct AlertEngine {
    rules: RwLock<Vec<Arc<AlertEntry>>>,
    capacity: usize,
    history: Mutex<VecDeque<AlertInstance>>,
    history_capacity: usize,
    next_id: AtomicU64,
    gate: ConcurrencyGate,
    ctx: Mutex<EvalContext>,
}

impl AlertEngine {
    pub fn new(capacity: usize, history_capacity: usize, max_concurrent: usize) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            capacity,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            next_id: AtomicU64::new(1),
            gate: ConcurrencyGate::new(max_concurrent),
            ctx: Mutex::new(EvalContext::new()),
        }
    }

    /// Compile and install an alert rule
    pub fn add_rule(&self, record: &RuleRecord) -> RuleResult<()> {
        let rule = Rule::compile(record)?;
        let mut rules = self.rules.write();
        if rules.len() >= self.capacity {
            return Err(RuleError::TableFull(self.capacity));
        }
        if rules.iter().any(|entry| entry.rule.name == rule.name) {
            return Err(RuleError::DuplicateRule(rule.name));
        }

        debug!(rule = %rule.name, severity = %rule.severity, "alert rule installed");
        let enabled = rule.enabled;
        rules.push(Arc::new(AlertEntry {
            rule,
            enabled: AtomicBool::new(enabled),
            triggers: Mutex::new(VecDeque::new()),
            suppress_until: Mutex::new(None),
            stats: AlertStats::default(),
        }));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> RuleResult<()> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|entry| entry.rule.name != name);
        if rules.len() == before {
            return Err(RuleError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> RuleResult<()> {
        let rules = self.rules.read();
        let entry = rules
            .iter()
            .find(|entry| entry.rule.name == name)
            .ok_or_else(|| RuleError::NotFound(name.to_string()))?;
        entry.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Evaluate every enabled alert rule against the event
    pub fn on_event(&self, event: &Event) -> usize {
        let entries: Vec<Arc<AlertEntry>> = self.rules.read().iter().cloned().collect();
        let mut raised = 0;

        for entry in entries {
            if !entry.enabled.load(Ordering::Acquire) {
                continue;
            }

            let matched = {
                let mut ctx = self.ctx.lock();
                entry.rule.condition.matches(&mut ctx, event)
            };
            if !matched {
                continue;
            }
            entry.stats.triggered.fetch_add(1, Ordering::Relaxed);

            let now = Instant::now();
            let suppressed = {
                let suppress = entry.suppress_until.lock();
                matches!(*suppress, Some(until) if now < until)
            };
            if suppressed {
                entry.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                self.push_instance(&entry, event, AlertState::Suppressed);
                trace!(rule = %entry.rule.name, "alert suppressed");
                continue;
            }

            if !entry.admit(now) {
                entry.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
                trace!(rule = %entry.rule.name, "alert rate limited");
                continue;
            }

            if entry.rule.suppress_sec > 0 {
                *entry.suppress_until.lock() =
                    Some(now + Duration::from_secs(entry.rule.suppress_sec));
            }

            self.push_instance(&entry, event, AlertState::Active);
            raised += 1;

            let slot = self.gate.acquire();
            if entry.rule.sync {
                Self::execute(&entry, event);
                drop(slot);
            } else {
                let entry_bg = Arc::clone(&entry);
                let event_bg = event.clone();
                let spawned = std::thread::Builder::new()
                    .name("netwatch-alert-action".to_string())
                    .spawn(move || {
                        Self::execute(&entry_bg, &event_bg);
                        drop(slot);
                    });
                if spawned.is_err() {
                    Self::execute(&entry, event);
                }
            }
        }
        raised
    }

    fn execute(entry: &Arc<AlertEntry>, event: &Event) {
        let outcome = run_action(
            &entry.rule.action,
            &entry.rule.name,
            entry.rule.severity,
            event,
        );
        entry.stats.record_outcome(&outcome);
    }

    fn push_instance(&self, entry: &Arc<AlertEntry>, event: &Event, state: AlertState) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = format!("{} matched {}", entry.rule.name, event.summary());
        message.truncate(MESSAGE_LIMIT);

        let instance = AlertInstance {
            id,
            rule: entry.rule.name.clone(),
            severity: entry.rule.severity,
            state,
            triggered_at: epoch_ns(),
            acked_at: None,
            resolved_at: None,
            acked_by: None,
            sequence: event.sequence,
            message,
        };

        let mut history = self.history.lock();
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(instance);
        id
    }

    /// Acknowledge an active alert
    pub fn acknowledge(&self, id: u64, actor: &str) -> RuleResult<()> {
        let mut history = self.history.lock();
        let instance = history
            .iter_mut()
            .find(|instance| instance.id == id)
            .ok_or(RuleError::AlertNotFound(id))?;

        if instance.state != AlertState::Active {
            return Err(RuleError::InvalidTransition(format!(
                "alert {} is {:?}, only active alerts can be acknowledged",
                id, instance.state
            )));
        }
        instance.state = AlertState::Acknowledged;
        instance.acked_at = Some(epoch_ns());
        instance.acked_by = Some(actor.to_string());
        Ok(())
    }

    /// Resolve an active or acknowledged alert
    pub fn resolve(&self, id: u64) -> RuleResult<()> {
        let mut history = self.history.lock();
        let instance = history
            .iter_mut()
            .find(|instance| instance.id == id)
            .ok_or(RuleError::AlertNotFound(id))?;

        match instance.state {
            AlertState::Active | AlertState::Acknowledged => {
                instance.state = AlertState::Resolved;
                instance.resolved_at = Some(epoch_ns());
                Ok(())
            }
            other => Err(RuleError::InvalidTransition(format!(
                "alert {} is {:?}, cannot resolve",
                id, other
            ))),
        }
    }

    /// Snapshot of the history ring, oldest first
    pub fn history(&self) -> Vec<AlertInstance> {
        self.history.lock().iter().cloned().collect()
    }

    /// Alerts currently in the Active state
    pub fn active(&self) -> Vec<AlertInstance> {
        self.history
            .lock()
            .iter()
            .filter(|instance| instance.state == AlertState::Active)
            .cloned()
            .collect()
    }

    pub fn stats(&self, name: &str) -> Option<AlertStatsSnapshot> {
        self.rules
            .read()
            .iter()
            .find(|entry| entry.rule.name == name)
            .map(|entry| entry.stats.snapshot())
    }

    /// Condition evaluations and matches across all alert rules
    pub fn eval_counters(&self) -> (u64, u64) {
        let ctx = self.ctx.lock();
        (ctx.eval_count, ctx.match_count)
    }

    /// Block until every in-flight action has released its slot
    pub fn wait_actions(&self) {
        while self.gate.available() < self.gate.capacity() {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
