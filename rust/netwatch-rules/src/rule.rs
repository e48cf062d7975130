// netwatch-rules: Rule definitions and config records

use crate::error::{RuleError, RuleResult};
use netwatch_event::Severity;
use netwatch_filter::CompiledFilter;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Webhook HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
}

/// What a rule does when its condition matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionSpec {
    /// Run a shell script with event environment variables
    Exec {
        script: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        /// Pipe stdout/stderr into a bounded buffer instead of /dev/null
        #[serde(default)]
        capture: bool,
    },
    /// Append (or truncate) a line to a log file
    Log {
        path: String,
        #[serde(default = "default_true")]
        append: bool,
    },
    /// Send a JSON document to an HTTP endpoint
    Webhook {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

/// Rate limit: at most `count` triggers per `window_sec` sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSpec {
    pub count: u32,
    pub window_sec: u64,
}

/// Rule definition as loaded from configuration
///
/// Unknown keys are rejected at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    pub name: String,
    /// Filter expression gating the action
    pub condition: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub action: ActionSpec,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
    /// Quiet period after a trigger, in seconds
    #[serde(default)]
    pub suppress_sec: u64,
    #[serde(default)]
    pub severity: Severity,
    /// Run the action in the dispatching worker instead of a helper thread
    #[serde(default)]
    pub sync: bool,
}

/// A validated rule with its condition compiled
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub condition: CompiledFilter,
    pub enabled: bool,
    pub action: ActionSpec,
    pub rate_limit: Option<RateLimitSpec>,
    pub suppress_sec: u64,
    pub severity: Severity,
    pub sync: bool,
}

impl Rule {
    /// Compile a config record into an installable rule
    pub fn compile(record: &RuleRecord) -> RuleResult<Self> {
        if record.name.is_empty() {
            return Err(RuleError::InvalidRule("rule name is empty".to_string()));
        }
        if let Some(rate_limit) = &record.rate_limit {
            if rate_limit.count == 0 || rate_limit.window_sec == 0 {
                return Err(RuleError::InvalidRule(format!(
                    "rule '{}': rate limit count and window must be non-zero",
                    record.name
                )));
            }
        }

        let condition = CompiledFilter::new(&record.condition)?;
        Ok(Self {
            name: record.name.clone(),
            condition,
            enabled: record.enabled,
            action: record.action.clone(),
            rate_limit: record.rate_limit,
            suppress_sec: record.suppress_sec,
            severity: record.severity,
            sync: record.sync,
        })
    }
}
