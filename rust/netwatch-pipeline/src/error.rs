// netwatch-pipeline: Error types

use thiserror::Error;

/// Pipeline result type
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline error types
///
/// Submission errors are best-effort signals: the processor never blocks
/// and never stops because one event was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("ring buffer full")]
    QueueFull,

    #[error("rate limited: {0}")]
    RateLimited(&'static str),

    #[error("processor is shutting down")]
    ShuttingDown,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker thread spawn failed: {0}")]
    Spawn(String),
}
