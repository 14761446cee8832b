//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the sandboxed search engine, loaded once at
//! process start from a TOML file with environment overrides and validation.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Range checks on result caps and context sizes
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (`LEGAL_DOC_ROOT`)
//! 2. Configuration file
//! 3. Default values
//!
//! The configuration is immutable for the lifetime of the process; there is
//! no hot-reload.
//!
//! ## Usage
//! ```rust,no_run
//! use legal_sandbox_search::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("corpus root: {:?}", config.corpus.root);
//! ```

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Corpus location and file matching
    pub corpus: CorpusConfig,
    /// Search behavior
    pub search: SearchLimitsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Corpus location configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Base directory containing the legal documents
    pub root: PathBuf,
    /// Default glob for searching files (brace alternation supported)
    pub glob: String,
}

/// Search limits and context defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimitsConfig {
    /// Default maximum number of files returned by whole-file search
    pub max_results: usize,
    /// Default symmetric byte padding for range reads
    pub context_bytes: usize,
    /// Default number of context lines around line-search matches
    pub context_lines: usize,
    /// Default line cap applied to range-read snippets
    pub max_lines: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| SearchError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| SearchError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.normalize_root();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Environment override for the corpus root takes precedence
        if let Ok(root) = std::env::var("LEGAL_DOC_ROOT") {
            self.corpus.root = PathBuf::from(root);
        }
    }

    /// Resolve the corpus root to an absolute path once
    fn normalize_root(&mut self) {
        if let Ok(resolved) = self.corpus.root.canonicalize() {
            self.corpus.root = resolved;
        } else if self.corpus.root.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                self.corpus.root = cwd.join(&self.corpus.root);
            }
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.search.max_results == 0 {
            return Err(SearchError::ValidationFailed {
                field: "search.max_results".to_string(),
                reason: "Result cap must be greater than zero".to_string(),
            });
        }

        if self.search.max_lines == 0 {
            return Err(SearchError::ValidationFailed {
                field: "search.max_lines".to_string(),
                reason: "Line cap must be greater than zero".to_string(),
            });
        }

        if self.corpus.glob.is_empty() {
            return Err(SearchError::ValidationFailed {
                field: "corpus.glob".to_string(),
                reason: "Default glob cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SearchError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            search: SearchLimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/"),
            glob: "**/*.{txt,md}".to_string(),
        }
    }
}

impl Default for SearchLimitsConfig {
    fn default() -> Self {
        Self {
            max_results: 50,
            context_bytes: 300,
            context_lines: 2,
            max_lines: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.corpus.glob, "**/*.{txt,md}");
        assert_eq!(config.search.max_results, 50);
        assert_eq!(config.search.context_bytes, 300);
        assert_eq!(config.search.max_lines, 20);
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = Config::default();
        config.search.max_results = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [search]
            max_results = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.search.max_results, 5);
        assert_eq!(parsed.search.context_bytes, 300);
        assert_eq!(parsed.corpus.glob, "**/*.{txt,md}");
    }
}
