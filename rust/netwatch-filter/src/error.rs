// netwatch-filter: Error types

use thiserror::Error;

/// Filter result type
pub type FilterResult<T> = Result<T, FilterError>;

/// Parse failure location and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseErrorInfo {
    pub message: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub col: u32,
    /// Byte offset into the expression
    pub pos: usize,
}

impl std::fmt::Display for ParseErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}, col {}", self.message, self.line, self.col)
    }
}

/// Filter error types
///
/// Evaluation never errors: type mismatches and missing payload fields
/// yield `false`, so only parsing and compilation can refuse a rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("parse error: {0}")]
    Parse(ParseErrorInfo),

    #[error("compile error: {0}")]
    Compile(String),
}

impl FilterError {
    pub fn parse(message: impl Into<String>, line: u32, col: u32, pos: usize) -> Self {
        FilterError::Parse(ParseErrorInfo {
            message: message.into(),
            line,
            col,
            pos,
        })
    }
}
