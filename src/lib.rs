//! # Sandboxed Legal Document Search Engine
//!
//! ## Overview
//! This library implements the retrieval core of a legal research agent: a
//! sandboxed, multi-modal text search layer over a corpus of statutes and
//! court decisions stored as plain `.txt`/`.md` files.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `sandbox`: path containment, file listing, and byte-offset line index
//! - `query`: boolean AND/OR query compilation into disjunctive normal form
//! - `matcher`: line matching backends (ripgrep subprocess and native)
//! - `search`: line search engine assembling structured hits with context,
//!   section headers, highlights, and byte ranges
//! - `file_search`: whole-file boolean search with glob filtering
//! - `reader`: clamped byte-range and line-window reads
//! - `server`: JSON-RPC tool dispatch over stdio
//! - `config`: configuration management and settings
//! - `errors`: centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Search queries (keywords, boolean expressions, regex), file
//!   lists, byte ranges
//! - **Output**: Structured hits with line numbers, context windows, and
//!   byte ranges suitable for follow-up range reads
//! - **Security**: All filesystem access stays below the configured corpus
//!   root and is limited to allowed extensions
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use legal_sandbox_search::{Config, Sandbox, SearchEngine, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::from_file("config.toml")?);
//!     let sandbox = Arc::new(Sandbox::new(&config.corpus.root)?);
//!     let engine = SearchEngine::with_ripgrep(config, sandbox)?;
//!     let response = engine
//!         .search_lines(&SearchRequest {
//!             query: "Kündigung".to_string(),
//!             file_list: None,
//!             max_results: None,
//!             context_lines: None,
//!             regex: false,
//!             case_sensitive: false,
//!         })
//!         .await;
//!     println!("Found {} matches", response.matches.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod file_search;
pub mod matcher;
pub mod query;
pub mod reader;
pub mod sandbox;
pub mod search;
pub mod server;

// Re-exports for convenience
pub use config::Config;
pub use errors::{Result, SearchError};
pub use file_search::{FileSearchRequest, FileSearchResponse};
pub use reader::{RangeRead, RangeReader};
pub use sandbox::Sandbox;
pub use search::{LineMatch, SearchEngine, SearchRequest, SearchResponse};
pub use server::ToolServer;

use std::sync::Arc;

/// Application state shared across the server and CLI entry points
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sandbox: Arc<Sandbox>,
    pub engine: Arc<SearchEngine>,
    pub reader: Arc<RangeReader>,
}

impl AppState {
    /// Wire up all components from a loaded configuration, using the
    /// ripgrep-backed matcher
    pub fn initialize(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let sandbox = Arc::new(Sandbox::new(&config.corpus.root)?);
        let engine = Arc::new(SearchEngine::with_ripgrep(config.clone(), sandbox.clone())?);
        let reader = Arc::new(RangeReader::new(sandbox.clone(), config.clone()));
        Ok(Self {
            config,
            sandbox,
            engine,
            reader,
        })
    }
}
