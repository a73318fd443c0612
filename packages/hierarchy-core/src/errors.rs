//! Error types for hierarchy-core
//!
//! Provides unified error handling across the crate. The error is `Clone`
//! because cached level streams replay a previously observed failure to every
//! later subscriber.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for hierarchy operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HierarchyError {
    /// The hierarchy definition failed while enumerating a level
    #[error("Hierarchy definition error: {0}")]
    Definition(String),

    /// The injected query executor failed
    #[error("Query execution error: {0}")]
    Execution(String),

    /// A query produced more rows than the requested hierarchy level size limit
    #[error("Rows limit of {limit} exceeded")]
    RowsLimitExceeded { limit: usize },

    /// Value formatter error
    #[error("Formatting error: {0}")]
    Formatting(String),

    /// A query row could not be turned into a node
    #[error("Row parse error: {0}")]
    Parse(String),

    /// No merged provider owns the requested parent node
    #[error("No provider owns parent node: {0}")]
    UnknownParent(String),

    /// More than one merged provider claims the requested parent node
    #[error("Several providers own parent node: {0}")]
    AmbiguousParent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Programming-contract violation (e.g. unresolvable grouping node)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How far an error reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Terminates only the affected subtree; the caller may retry
    Recoverable,
    /// Contract violation; should be treated as a bug
    Fatal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Recoverable => "recoverable",
            ErrorCategory::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl HierarchyError {
    pub fn definition(msg: impl std::fmt::Display) -> Self {
        Self::Definition(msg.to_string())
    }

    pub fn execution(msg: impl std::fmt::Display) -> Self {
        Self::Execution(msg.to_string())
    }

    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Self::Parse(msg.to_string())
    }

    pub fn formatting(msg: impl std::fmt::Display) -> Self {
        Self::Formatting(msg.to_string())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn is_rows_limit_exceeded(&self) -> bool {
        matches!(self, Self::RowsLimitExceeded { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Internal(_) => ErrorCategory::Fatal,
            _ => ErrorCategory::Recoverable,
        }
    }
}

impl From<ConfigError> for HierarchyError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for HierarchyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Result type alias for hierarchy operations
pub type Result<T> = std::result::Result<T, HierarchyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(
            HierarchyError::RowsLimitExceeded { limit: 5 }.category(),
            ErrorCategory::Recoverable
        );
        assert_eq!(
            HierarchyError::internal("grouping node without ancestor").category(),
            ErrorCategory::Fatal
        );
    }

    #[test]
    fn test_rows_limit_message() {
        let err = HierarchyError::RowsLimitExceeded { limit: 10 };
        assert!(err.is_rows_limit_exceeded());
        assert_eq!(err.to_string(), "Rows limit of 10 exceeded");
    }
}
