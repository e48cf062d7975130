// netwatch-correlate: Error types

use thiserror::Error;

/// Correlation result type
pub type CorrelateResult<T> = Result<T, CorrelateError>;

/// Correlation engine error types
#[derive(Debug, Error)]
pub enum CorrelateError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("rule not found: {0}")]
    NotFound(String),
}

impl From<netwatch_filter::FilterError> for CorrelateError {
    fn from(err: netwatch_filter::FilterError) -> Self {
        CorrelateError::InvalidCondition(err.to_string())
    }
}
