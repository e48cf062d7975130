// netwatch: Kernel network event monitoring pipeline
// Wires ingestion → processor → filter-gated hook/alert/correlation/security engines

pub mod config;
pub mod monitor;
pub mod telemetry;

pub use config::{
    CorrelationSettings, EngineSettings, MonitorConfig, PatternSettings, PipelineSettings,
    RateSettings, SecuritySettings,
};
pub use monitor::{Monitor, MonitorStats};
pub use telemetry::init_tracing;

// Re-export the crates behind the facade
pub use netwatch_correlate as correlate;
pub use netwatch_event as event;
pub use netwatch_filter as filter;
pub use netwatch_pipeline as pipeline;
pub use netwatch_rules as rules;

pub use netwatch_event::{Event, EventSource, EventType, IfName, Payload, ReplaySource, Severity};
pub use netwatch_pipeline::{EventProcessor, ProcessorConfig, ProcessorStats};
pub use netwatch_rules::RuleRecord;
