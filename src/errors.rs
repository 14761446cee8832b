//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the sandboxed search engine, providing
//! structured error types for all components and conversion utilities from
//! common library errors.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from sandbox, matcher, search, and config code
//! - **Output**: Structured error types with context
//! - **Error Categories**: Security, Matcher, Configuration, Search, I/O
//!
//! ## Key Features
//! - Security faults (path breakout) are always fatal for the operation
//! - Matcher unavailability is recoverable and surfaced as a response payload
//! - Best-effort faults (bad event lines, unreadable files, out-of-range
//!   offsets) are absorbed at the call site and never reach this enum
//!
//! ## Usage
//! ```rust
//! use legal_sandbox_search::errors::{Result, SearchError};
//!
//! fn guard(path: &str) -> Result<()> {
//!     Err(SearchError::PathBreakout { path: path.to_string() })
//! }
//! ```

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, SearchError>;

/// Error types for the sandboxed search engine
#[derive(Debug, Error)]
pub enum SearchError {
    /// Attempt to resolve a path outside the sandbox root
    #[error("path breakout attempt detected: {path}")]
    PathBreakout { path: String },

    /// External line matcher binary missing from PATH
    #[error("{binary} is required for line search but was not found on PATH")]
    MatcherUnavailable { binary: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Invalid search query
    #[error("invalid search query: {query} - {reason}")]
    InvalidSearchQuery { query: String, reason: String },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal system errors
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SearchError {
    /// Check if the error is recoverable (caller may retry or degrade)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SearchError::MatcherUnavailable { .. })
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::PathBreakout { .. } => "security",
            SearchError::MatcherUnavailable { .. } => "matcher",
            SearchError::Config { .. } | SearchError::ValidationFailed { .. } => "configuration",
            SearchError::InvalidSearchQuery { .. } => "search",
            SearchError::Io(_) | SearchError::Json(_) | SearchError::Toml(_) => "io",
            SearchError::Internal { .. } => "generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = SearchError::PathBreakout {
            path: "../../etc/passwd".to_string(),
        };
        assert_eq!(err.category(), "security");
        assert!(!err.is_recoverable());

        let err = SearchError::MatcherUnavailable {
            binary: "rg".to_string(),
        };
        assert_eq!(err.category(), "matcher");
        assert!(err.is_recoverable());
    }
}
