// netwatch-rules: Error types

use thiserror::Error;

/// Rule result type
pub type RuleResult<T> = Result<T, RuleError>;

/// Rule engine error types
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("rule table full: capacity {0}")]
    TableFull(usize),

    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("alert not found: {0}")]
    AlertNotFound(u64),

    #[error("invalid alert state transition: {0}")]
    InvalidTransition(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("http error: {0}")]
    Http(String),
}

impl From<netwatch_filter::FilterError> for RuleError {
    fn from(err: netwatch_filter::FilterError) -> Self {
        RuleError::InvalidCondition(err.to_string())
    }
}

impl From<std::io::Error> for RuleError {
    fn from(err: std::io::Error) -> Self {
        RuleError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for RuleError {
    fn from(err: reqwest::Error) -> Self {
        RuleError::Http(err.to_string())
    }
}
