//! # Whole-File Boolean Search Module
//!
//! ## Purpose
//! Finds candidate files by applying boolean term sets to entire file
//! contents instead of single lines, with glob and brace-expansion
//! filtering.
//!
//! ## Input/Output Specification
//! - **Input**: Optional boolean query, optional glob, case flag, result cap
//! - **Output**: `{files: [relative_paths]}` in traversal order
//! - **Semantics**: a file matches when any conjunction's terms are all
//!   present somewhere in its content
//!
//! ## Key Features
//! - `**/*.{md,txt}`-style brace alternation expands into simple glob
//!   patterns
//! - Plain multi-word queries become an implicit AND conjunction; a single
//!   word or phrase is one conjunction
//! - Traversal stops as soon as the cap is reached, so results are
//!   first-encountered, not ranked

use crate::query;
use crate::search::SearchEngine;
use serde::{Deserialize, Serialize};

/// Whole-file search request parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSearchRequest {
    /// Boolean expression over file contents; empty means "all files"
    #[serde(default)]
    pub query: Option<String>,
    /// Glob limiting which files are considered (defaults to config glob)
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Cap on returned files (defaults to config max_results)
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Whole-file search response payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSearchResponse {
    pub files: Vec<String>,
}

/// Expand a single brace alternation (`**/*.{txt,md}`) into simple globs.
/// Globs without braces pass through unchanged.
pub(crate) fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(open) = pattern.find('{') {
        if let Some(close_rel) = pattern[open..].find('}') {
            let close = open + close_rel;
            let prefix = &pattern[..open];
            let suffix = &pattern[close + 1..];
            let variants: Vec<String> = pattern[open + 1..close]
                .split(',')
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}{}{}", prefix, v, suffix))
                .collect();
            if !variants.is_empty() {
                return variants;
            }
        }
    }
    vec![pattern.to_string()]
}

impl SearchEngine {
    /// Return files whose whole content satisfies the boolean query.
    ///
    /// Files are tested in traversal order and collection stops at the cap;
    /// there is no relevance ordering here, unlike the line search.
    pub async fn search_files(&self, request: &FileSearchRequest) -> FileSearchResponse {
        self.stats.lock().file_searches += 1;

        let glob_text = request
            .glob
            .clone()
            .unwrap_or_else(|| self.config.corpus.glob.clone());
        let limit = request
            .max_results
            .unwrap_or(self.config.search.max_results);

        let patterns: Vec<glob::Pattern> = expand_braces(&glob_text)
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let term_sets = build_term_sets(request.query.as_deref(), request.case_sensitive);

        let mut matched = Vec::new();
        for rel in self.sandbox.list_paths(".").unwrap_or_default() {
            if matched.len() >= limit {
                break;
            }
            if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&rel)) {
                continue;
            }
            if term_sets.is_empty() {
                matched.push(rel);
                continue;
            }
            let Ok(abs) = self.sandbox.resolve_inside(&rel) else {
                continue;
            };
            let content = match tokio::fs::read(&abs).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::debug!("skipping unreadable file {}: {}", rel, e);
                    continue;
                }
            };
            let haystack = if request.case_sensitive {
                content
            } else {
                content.to_lowercase()
            };
            let satisfied = term_sets
                .iter()
                .any(|conj| conj.iter().all(|term| haystack.contains(term)));
            if satisfied {
                matched.push(rel);
            }
        }

        FileSearchResponse { files: matched }
    }
}

/// Conjunctions to test against file contents, case-folded when the search
/// is insensitive. Boolean queries use the DNF compiler; plain multi-word
/// queries become one implicit AND conjunction.
fn build_term_sets(raw_query: Option<&str>, case_sensitive: bool) -> Vec<Vec<String>> {
    let Some(raw_query) = raw_query.map(str::trim).filter(|q| !q.is_empty()) else {
        return Vec::new();
    };
    let fold = |term: &str| {
        if case_sensitive {
            term.to_string()
        } else {
            term.to_lowercase()
        }
    };

    let (used_boolean, dnf) = query::parse_to_dnf(raw_query);
    if used_boolean && !dnf.is_empty() {
        return dnf
            .iter()
            .map(|conj| conj.iter().map(|t| fold(t)).collect())
            .collect();
    }
    let words: Vec<String> = raw_query.split_whitespace().map(fold).collect();
    if words.len() > 1 {
        vec![words]
    } else {
        vec![vec![fold(raw_query)]]
    }
}
