// netwatch-rules: Action sinks
// Child process, log append, HTTP webhook

pub mod exec;
pub mod log;
pub mod webhook;

use crate::rule::ActionSpec;
use netwatch_event::{Event, Severity};
use std::time::{Duration, Instant};

/// Terminal state of one action run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Failed,
    Timeout,
}

/// Result of running one action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub duration: Duration,
    /// Failure or timeout detail for logs
    pub detail: Option<String>,
    /// Bounded child output when capture was requested
    pub captured: Option<String>,
}

impl ActionOutcome {
    pub fn success(duration: Duration) -> Self {
        Self {
            status: ActionStatus::Success,
            duration,
            detail: None,
            captured: None,
        }
    }

    pub fn failed(duration: Duration, detail: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            duration,
            detail: Some(detail.into()),
            captured: None,
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self {
            status: ActionStatus::Timeout,
            duration,
            detail: Some("deadline exceeded".to_string()),
            captured: None,
        }
    }
}

/// Run an action against one event, timing the whole attempt
pub fn run_action(
    action: &ActionSpec,
    rule_name: &str,
    severity: Severity,
    event: &Event,
) -> ActionOutcome {
    let started = Instant::now();
    match action {
        ActionSpec::Exec {
            script,
            timeout_ms,
            capture,
        } => exec::run(script, event, *timeout_ms, *capture, started),
        ActionSpec::Log { path, append } => {
            log::run(path, *append, rule_name, severity, event, started)
        }
        ActionSpec::Webhook {
            url,
            method,
            timeout_ms,
        } => webhook::run(url, *method, *timeout_ms, rule_name, severity, event, started),
    }
}
