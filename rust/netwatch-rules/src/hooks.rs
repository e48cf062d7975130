// netwatch-rules: Hook engine
// Compiled conditions evaluated on the hot path; matching events fire
// actions under per-rule rate limits, suppression and a concurrency gate

use crate::actions::{run_action, ActionOutcome, ActionStatus};
use crate::error::{RuleError, RuleResult};
use crate::gate::ConcurrencyGate;
use crate::rule::{Rule, RuleRecord};
use netwatch_event::Event;
use netwatch_filter::EvalContext;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Per-hook counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookStatsSnapshot {
    pub triggered: u64,
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub suppressed: u64,
    pub rate_limited: u64,
    pub total_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
}

#[derive(Default)]
struct HookStats {
    triggered: AtomicU64,
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    suppressed: AtomicU64,
    rate_limited: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl HookStats {
    fn new() -> Self {
        let stats = Self::default();
        stats.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        stats
    }

    fn record_outcome(&self, outcome: &ActionOutcome) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        match outcome.status {
            ActionStatus::Success => self.succeeded.fetch_add(1, Ordering::Relaxed),
            ActionStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            ActionStatus::Timeout => self.timeouts.fetch_add(1, Ordering::Relaxed),
        };

        let ms = outcome.duration.as_millis() as u64;
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HookStatsSnapshot {
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        HookStatsSnapshot {
            triggered: self.triggered.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            min_duration_ms: if min == u64::MAX { 0 } else { min },
            max_duration_ms: self.max_duration_ms.load(Ordering::Relaxed),
        }
    }
}

struct HookEntry {
    rule: Rule,
    enabled: AtomicBool,
    /// Recent trigger times, bounded by the rate-limit count
    triggers: Mutex<VecDeque<Instant>>,
    suppress_until: Mutex<Option<Instant>>,
    stats: HookStats,
}

impl HookEntry {
    /// Sliding-window rate limit: true when this trigger may proceed
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

/// Hook engine
///
/// Holds a bounded table of rules. Evaluation happens against a shared
/// context under its own mutex; the matched entry is snapshotted and
/// the action runs outside the rules lock, gated by `max_concurrent`.
pub struct HookEngine {
    hooks: RwLock<Vec<Arc<HookEntry>>>,
    capacity: usize,
    gate: ConcurrencyGate,
    ctx: Mutex<EvalContext>,
}

impl HookEngine {
    pub fn new(capacity: usize, max_concurrent: usize) -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            capacity,
            gate: ConcurrencyGate::new(max_concurrent),
            ctx: Mutex::new(EvalContext::new()),
        }
    }

    /// Compile and install a rule from its config record
    pub fn add_rule(&self, record: &RuleRecord) -> RuleResult<()> {
        self.install(Rule::compile(record)?)
    }

    /// Install an already-compiled rule
    pub fn install(&self, rule: Rule) -> RuleResult<()> {
        let mut hooks = self.hooks.write();
        if hooks.len() >= self.capacity {
            return Err(RuleError::TableFull(self.capacity));
        }
        if hooks.iter().any(|entry| entry.rule.name == rule.name) {
            return Err(RuleError::DuplicateRule(rule.name));
        }

        debug!(rule = %rule.name, "hook installed");
        let enabled = rule.enabled;
        hooks.push(Arc::new(HookEntry {
            rule,
            enabled: AtomicBool::new(enabled),
            triggers: Mutex::new(VecDeque::new()),
            suppress_until: Mutex::new(None),
            stats: HookStats::new(),
        }));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> RuleResult<()> {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|entry| entry.rule.name != name);
        if hooks.len() == before {
            return Err(RuleError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> RuleResult<()> {
        let hooks = self.hooks.read();
        let entry = hooks
            .iter()
            .find(|entry| entry.rule.name == name)
            .ok_or_else(|| RuleError::NotFound(name.to_string()))?;
        entry.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Evaluate every enabled hook against the event; returns how many
    /// actions were launched
    pub fn on_event(&self, event: &Event) -> usize {
        let entries: Vec<Arc<HookEntry>> = self.hooks.read().iter().cloned().collect();
        let mut launched = 0;

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
            {
                let suppress = entry.suppress_until.lock();
                if let Some(until) = *suppress {
                    if now < until {
                        entry.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                        trace!(rule = %entry.rule.name, "hook suppressed");
                        continue;
                    }
                }
            }

            if !entry.admit(now) {
                entry.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
                trace!(rule = %entry.rule.name, "hook rate limited");
                continue;
            }

            if entry.rule.suppress_sec > 0 {
                *entry.suppress_until.lock() =
                    Some(now + Duration::from_secs(entry.rule.suppress_sec));
            }

            // Bounded concurrency: blocks when every slot is busy
            let slot = self.gate.acquire();
            launched += 1;

            if entry.rule.sync {
                Self::execute(&entry, event);
                drop(slot);
            } else {
                let entry_bg = Arc::clone(&entry);
                let event_bg = event.clone();
                let spawned = std::thread::Builder::new()
                    .name("netwatch-hook-action".to_string())
                    .spawn(move || {
                        Self::execute(&entry_bg, &event_bg);
                        drop(slot);
                    });
                if spawned.is_err() {
                    // Helper thread unavailable; run inline rather than
                    // lose the action (its slot was released with the
                    // dropped closure)
                    Self::execute(&entry, event);
                }
            }
        }
        launched
    }

    fn execute(entry: &Arc<HookEntry>, event: &Event) {
        let outcome = run_action(
            &entry.rule.action,
            &entry.rule.name,
            entry.rule.severity,
            event,
        );
        entry.stats.record_outcome(&outcome);
    }

    /// Per-hook counter snapshot
    pub fn stats(&self, name: &str) -> Option<HookStatsSnapshot> {
        self.hooks
            .read()
            .iter()
            .find(|entry| entry.rule.name == name)
            .map(|entry| entry.stats.snapshot())
    }

    /// Condition evaluations and matches across all hooks
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
