// netwatch: Monitor configuration
// Loading hierarchy: env > file > defaults, with a validation pass

use anyhow::{bail, Context, Result};
use netwatch_rules::RuleRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Token-bucket settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateSettings {
    /// Tokens per second
    pub rate: f64,
    pub burst: f64,
}

/// Pipeline sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineSettings {
    pub ring_capacity: usize,
    /// 0 selects the CPU count
    pub workers: usize,
    pub max_pending: usize,
    /// 0 disables pooling
    pub pool_capacity: usize,
    pub global_rate: Option<RateSettings>,
    pub per_type_rate: Option<RateSettings>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ring_capacity: 4096,
            workers: 0,
            max_pending: 8192,
            pool_capacity: 1024,
            global_rate: None,
            per_type_rate: None,
        }
    }
}

/// Rule engine sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineSettings {
    pub hook_capacity: usize,
    pub hook_max_concurrent: usize,
    pub alert_capacity: usize,
    pub alert_history: usize,
    pub alert_max_concurrent: usize,
    pub correlation_window_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hook_capacity: 64,
            hook_max_concurrent: 8,
            alert_capacity: 64,
            alert_history: 256,
            alert_max_concurrent: 8,
            correlation_window_capacity: 1024,
        }
    }
}

/// Pattern detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PatternSettings {
    pub min_frequency: u64,
    pub window_sec: u64,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            min_frequency: 10,
            window_sec: 60,
        }
    }
}

/// Security detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SecuritySettings {
    pub neigh_flood_threshold: usize,
    pub neigh_flood_window_sec: u64,
    pub storm_threshold: u64,
    pub storm_window_sec: u64,
    pub suspicious_names: Vec<String>,
}

impl Default for SecuritySettings {
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

/// Correlation rule as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationSettings {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    pub time_window_sec: u64,
    pub event_count: usize,
}

/// Full monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MonitorConfig {
    pub pipeline: PipelineSettings,
    pub engines: EngineSettings,
    pub pattern: PatternSettings,
    pub security: SecuritySettings,
    pub hooks: Vec<RuleRecord>,
    pub alerts: Vec<RuleRecord>,
    pub correlations: Vec<CorrelationSettings>,
}

impl MonitorConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: MonitorConfig =
            toml::from_str(text).context("parsing monitor configuration")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON text (the rule-record wire shape)
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: MonitorConfig =
            serde_json::from_str(text).context("parsing monitor configuration")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).context("parsing monitor configuration")?
        } else {
            MonitorConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides beat file values
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("NETWATCH_WORKERS") {
            if let Ok(workers) = value.parse() {
                self.pipeline.workers = workers;
            }
        }
        if let Ok(value) = std::env::var("NETWATCH_RING_CAPACITY") {
            if let Ok(capacity) = value.parse() {
                self.pipeline.ring_capacity = capacity;
            }
        }
        if let Ok(value) = std::env::var("NETWATCH_POOL_CAPACITY") {
            if let Ok(capacity) = value.parse() {
                self.pipeline.pool_capacity = capacity;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.ring_capacity == 0 {
            bail!("pipeline.ring_capacity must be non-zero");
        }
        if self.pipeline.max_pending == 0 {
            bail!("pipeline.max_pending must be non-zero");
        }
        if let Some(rate) = &self.pipeline.global_rate {
            if rate.burst <= 0.0 || rate.rate < 0.0 {
                bail!("pipeline.global_rate must have positive burst and non-negative rate");
            }
        }
        for correlation in &self.correlations {
            if correlation.event_count == 0 || correlation.time_window_sec == 0 {
                bail!(
                    "correlation '{}': event_count and time_window_sec must be non-zero",
                    correlation.name
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.ring_capacity, 4096);
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml_text = r#"
[pipeline]
ring_capacity = 128
workers = 2
max_pending = 256
pool_capacity = 64

[pipeline.global_rate]
rate = 100.0
burst = 50.0

[[hooks]]
name = "eth0-log"
condition = 'interface == "eth0"'

[hooks.action]
type = "log"
path = "/tmp/netwatch-hooks.log"

[[correlations]]
name = "flap"
conditions = ['event_type IN [1, 2]']
time_window_sec = 5
event_count = 3
"#;
        let config = MonitorConfig::from_toml(toml_text).unwrap();
        assert_eq!(config.pipeline.ring_capacity, 128);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.hooks.len(), 1);
        assert_eq!(config.hooks[0].name, "eth0-log");
        assert_eq!(config.correlations[0].event_count, 3);
    }

    #[test]
    fn test_json_form() {
        let json = r#"{
            "alerts": [{
                "name": "route-change",
                "condition": "event_type IN [5, 6]",
                "action": {"type": "webhook", "url": "http://alerts.local/in"},
                "severity": "critical"
            }]
        }"#;
        let config = MonitorConfig::from_json(json).unwrap();
        assert_eq!(config.alerts.len(), 1);
        assert_eq!(config.alerts[0].name, "route-change");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let toml_text = r#"
[pipeline]
ring_capacity = 128
mystery_knob = true
"#;
        assert!(MonitorConfig::from_toml(toml_text).is_err());
    }

    #[test]
    fn test_invalid_correlation_rejected() {
        let toml_text = r#"
[[correlations]]
name = "broken"
time_window_sec = 0
event_count = 3
"#;
        assert!(MonitorConfig::from_toml(toml_text).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MonitorConfig::load(Path::new("/nonexistent/netwatch.toml")).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }
}
