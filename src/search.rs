//! # Line Search Engine Module
//!
//! ## Purpose
//! Main search engine over the sandboxed corpus: compiles queries, drives a
//! line matcher backend, and assembles raw match/context events into
//! structured hits with context windows, section headers, highlights, and
//! byte ranges.
//!
//! ## Input/Output Specification
//! - **Input**: Search requests (query, optional file list, caps, flags)
//! - **Output**: `{matches: [...]}` payloads, or `{error, matches: []}` when
//!   the matcher backend is unavailable
//! - **Ordering**: files with a trailing 4-digit year in the filename sort
//!   year-descending; files without a year sort first
//!
//! ## Key Features
//! - Boolean queries compile to DNF lookahead patterns; explicit `" OR "`
//!   queries take a lighter alternation path
//! - File lists may name single files, directories, glob patterns, or the
//!   whole corpus; entries that fail sandbox or extension checks are skipped
//! - Context windows prefer matcher-emitted context events and fall back to
//!   a cached whole-file read for window edges
//! - Per-event and per-file failures degrade to partial results

use crate::config::Config;
use crate::errors::{Result, SearchError};
use crate::file_search::expand_braces;
use crate::matcher::{LineEvent, LineMatcher, MatchRequest, PatternSpec, RipgrepMatcher};
use crate::query;
use crate::sandbox::Sandbox;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default cap on line-search hits when the caller does not pass one
pub const DEFAULT_MAX_MATCHES: usize = 20;

/// Main search engine
pub struct SearchEngine {
    pub(crate) config: Arc<Config>,
    pub(crate) sandbox: Arc<Sandbox>,
    matcher: Box<dyn LineMatcher>,
    file_lines: DashMap<PathBuf, Arc<Vec<String>>>,
    pub(crate) stats: Mutex<SearchStats>,
    header_re: Regex,
    year_re: Regex,
}

/// Line search request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text: keyword, phrase, boolean expression, or regex
    pub query: String,
    /// Restrict the search to these files, directories, or glob patterns
    #[serde(default)]
    pub file_list: Option<Vec<String>>,
    /// Cap on returned hits (default 20)
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Context lines on each side of a match (default from config)
    #[serde(default)]
    pub context_lines: Option<usize>,
    /// Treat the query as a regex pattern
    #[serde(default)]
    pub regex: bool,
    /// Case-sensitive matching
    #[serde(default)]
    pub case_sensitive: bool,
}

/// One line-level hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineMatch {
    /// POSIX-style path relative to the corpus root
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// Matched line text without the terminator
    pub text: String,
    /// Line text with query terms wrapped in emphasis markers
    pub highlighted: String,
    /// Surrounding lines, match lines flagged
    pub context: Vec<ContextRow>,
    /// Nearest preceding Markdown heading, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Absolute byte range of the first sub-match, for `read_file_range`
    pub byte_range: [u64; 2],
}

/// One row of a context window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRow {
    pub line_number: usize,
    pub text: String,
    pub is_match: bool,
}

/// Line search response payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<LineMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Engine counters for metrics and logging
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub line_searches: u64,
    pub file_searches: u64,
    pub hits_returned: u64,
}

struct LineEntry {
    text: String,
    is_match: bool,
    submatch: Option<(usize, usize)>,
}

impl SearchEngine {
    /// Create a search engine with an explicit matcher backend
    pub fn new(
        config: Arc<Config>,
        sandbox: Arc<Sandbox>,
        matcher: Box<dyn LineMatcher>,
    ) -> Result<Self> {
        let header_re = Regex::new(r"^#{1,6}\s+\S").map_err(|e| SearchError::Internal {
            message: format!("header pattern failed to compile: {}", e),
        })?;
        let year_re = Regex::new(r"(\d{4})\.[^./]+$").map_err(|e| SearchError::Internal {
            message: format!("year pattern failed to compile: {}", e),
        })?;
        Ok(Self {
            config,
            sandbox,
            matcher,
            file_lines: DashMap::new(),
            stats: Mutex::new(SearchStats::default()),
            header_re,
            year_re,
        })
    }

    /// Create a search engine backed by the ripgrep subprocess adapter
    pub fn with_ripgrep(config: Arc<Config>, sandbox: Arc<Sandbox>) -> Result<Self> {
        Self::new(config, sandbox, Box::new(RipgrepMatcher::new()))
    }

    /// Current engine counters
    pub fn get_stats(&self) -> SearchStats {
        self.stats.lock().clone()
    }

    /// Search lines across the corpus and return structured hits.
    ///
    /// Matcher unavailability is returned as an `error` payload with empty
    /// matches, never raised.
    pub async fn search_lines(&self, request: &SearchRequest) -> SearchResponse {
        self.stats.lock().line_searches += 1;

        let max_results = request.max_results.unwrap_or(DEFAULT_MAX_MATCHES);
        let context_lines = request
            .context_lines
            .unwrap_or(self.config.search.context_lines);

        let pattern = compile_pattern(&request.query, request.regex);
        let files = self.resolve_file_list(request.file_list.as_deref());
        if files.is_empty() {
            return SearchResponse::default();
        }

        let match_request = MatchRequest {
            pattern,
            files,
            context_lines,
            case_sensitive: request.case_sensitive,
            max_count: max_results,
        };

        let events = match self.matcher.run(&self.sandbox, &match_request).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("line matcher failed: {}", e);
                return SearchResponse {
                    matches: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let highlighter = build_highlighter(&request.query, request.regex, request.case_sensitive);
        let mut matches = Vec::new();

        for (path, lines) in group_events(events) {
            let abs = match self.sandbox.resolve_inside(&path) {
                Ok(abs) => abs,
                Err(e) => {
                    tracing::warn!("dropping matcher output outside sandbox: {}", e);
                    continue;
                }
            };
            if !Sandbox::is_allowed_file(&abs) {
                continue;
            }

            for (&line_number, entry) in lines.iter().filter(|(_, e)| e.is_match) {
                let line_start = match self.sandbox.line_start_offset(&abs, line_number) {
                    Ok(offset) => offset,
                    Err(e) => {
                        tracing::debug!("skipping hit without offsets in {}: {}", path, e);
                        continue;
                    }
                };
                let text = clean_line(&entry.text);
                let (sm_start, sm_end) = entry.submatch.unwrap_or((0, text.len()));
                let byte_range = [line_start + sm_start as u64, line_start + sm_end as u64];

                let context =
                    self.assemble_context(&abs, &lines, line_number, context_lines);
                let section = self.nearest_section(&abs, line_number);
                let highlighted = highlighter
                    .as_ref()
                    .map(|re| re.replace_all(&text, "**$0**").into_owned())
                    .unwrap_or_else(|| text.clone());

                matches.push(LineMatch {
                    file: path.clone(),
                    line: line_number,
                    text,
                    highlighted,
                    context,
                    section,
                    byte_range,
                });
            }
        }

        matches.sort_by_key(|m| std::cmp::Reverse(self.year_key(&m.file)));
        matches.truncate(max_results);
        self.stats.lock().hits_returned += matches.len() as u64;

        SearchResponse {
            matches,
            error: None,
        }
    }

    /// Resolve a caller-supplied file list into validated relative paths.
    ///
    /// Entries may be single files, directories, glob patterns, or the
    /// whole-corpus markers `"."`/`"./"`. Invalid entries are skipped; an
    /// empty result falls back to the whole corpus.
    fn resolve_file_list(&self, file_list: Option<&[String]>) -> Vec<String> {
        let whole_corpus = || self.sandbox.list_paths(".").unwrap_or_default();

        let Some(entries) = file_list.filter(|l| !l.is_empty()) else {
            return whole_corpus();
        };

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        let mut push = |path: String, seen: &mut HashSet<String>, out: &mut Vec<String>| {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        };

        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry == "." || entry == "./" {
                for path in whole_corpus() {
                    push(path, &mut seen, &mut resolved);
                }
                continue;
            }
            if entry.contains(['*', '?', '[', '{']) {
                for pattern_text in expand_braces(entry) {
                    let Ok(pattern) = glob::Pattern::new(&pattern_text) else {
                        continue;
                    };
                    for path in whole_corpus() {
                        if pattern.matches(&path) {
                            push(path, &mut seen, &mut resolved);
                        }
                    }
                }
                continue;
            }
            let abs = match self.sandbox.resolve_inside(entry) {
                Ok(abs) => abs,
                Err(e) => {
                    tracing::debug!("skipping file list entry {}: {}", entry, e);
                    continue;
                }
            };
            if abs.is_dir() {
                if let Ok(listed) = self.sandbox.list_paths(entry) {
                    for path in listed {
                        push(path, &mut seen, &mut resolved);
                    }
                }
            } else if abs.is_file() && Sandbox::is_allowed_file(&abs) {
                push(
                    entry.trim_start_matches("./").replace('\\', "/"),
                    &mut seen,
                    &mut resolved,
                );
            }
        }

        if resolved.is_empty() {
            whole_corpus()
        } else {
            resolved
        }
    }

    /// Build the `[line - n, line + n]` context window, preferring event
    /// text and falling back to a cached read of the whole file
    fn assemble_context(
        &self,
        abs: &Path,
        lines: &BTreeMap<usize, LineEntry>,
        line_number: usize,
        context_lines: usize,
    ) -> Vec<ContextRow> {
        if context_lines == 0 {
            return Vec::new();
        }
        let first = line_number.saturating_sub(context_lines).max(1);
        let last = line_number + context_lines;
        let mut rows = Vec::new();
        for n in first..=last {
            let text = match lines.get(&n) {
                Some(entry) => Some(clean_line(&entry.text)),
                None => self.cached_line(abs, n),
            };
            let Some(text) = text else {
                continue;
            };
            let is_match = lines.get(&n).map(|e| e.is_match).unwrap_or(false);
            rows.push(ContextRow {
                line_number: n,
                text,
                is_match,
            });
        }
        rows
    }

    /// Nearest preceding Markdown heading, scanned upward from the line
    /// before the match
    fn nearest_section(&self, abs: &Path, line_number: usize) -> Option<String> {
        let lines = self.file_lines(abs)?;
        let upper = line_number.saturating_sub(1).min(lines.len());
        for n in (1..=upper).rev() {
            let candidate = &lines[n - 1];
            if self.header_re.is_match(candidate) {
                return Some(candidate.trim_end().to_string());
            }
        }
        None
    }

    fn cached_line(&self, abs: &Path, line_number: usize) -> Option<String> {
        let lines = self.file_lines(abs)?;
        lines.get(line_number.checked_sub(1)?).cloned()
    }

    /// Whole-file line cache backing context fallback and header lookup;
    /// unreadable files resolve to `None` and the hit is returned without
    /// the extra metadata
    fn file_lines(&self, abs: &Path) -> Option<Arc<Vec<String>>> {
        if let Some(cached) = self.file_lines.get(abs) {
            return Some(cached.clone());
        }
        let bytes = match std::fs::read(abs) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("context fallback read failed for {:?}: {}", abs, e);
                return None;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        let lines = Arc::new(lines);
        self.file_lines.insert(abs.to_path_buf(), lines.clone());
        Some(lines)
    }

    /// Sort key: trailing 4-digit year in the filename, or `u32::MAX` for
    /// files without one so they sort before all dated files
    fn year_key(&self, file: &str) -> u32 {
        self.year_re
            .captures(file)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(u32::MAX)
    }
}

/// Compile a query into the pattern handed to the matcher backend
fn compile_pattern(raw_query: &str, regex_mode: bool) -> PatternSpec {
    if regex_mode {
        return PatternSpec::Regex(raw_query.to_string());
    }
    let upper = raw_query.to_uppercase();
    let has_conjunction = upper.contains(" AND ") || raw_query.contains('(');
    if !has_conjunction {
        // explicit " OR " forces regex mode with a plain alternation
        if let Some(alternation) = query::or_alternation(raw_query) {
            return PatternSpec::Regex(alternation);
        }
    }
    let (used_boolean, dnf) = query::parse_to_dnf(raw_query);
    if used_boolean && !dnf.is_empty() {
        let pattern = query::dnf_to_line_regex(&dnf, false);
        return PatternSpec::LookaheadDnf { pattern, dnf };
    }
    PatternSpec::Literal(raw_query.to_string())
}

/// Build the highlight pattern for a query; `None` falls back to plain text
fn build_highlighter(raw_query: &str, regex_mode: bool, case_sensitive: bool) -> Option<Regex> {
    let pattern = if regex_mode {
        raw_query.to_string()
    } else {
        let (used_boolean, dnf) = query::parse_to_dnf(raw_query);
        if used_boolean && !dnf.is_empty() {
            let mut seen = HashSet::new();
            let mut terms = Vec::new();
            for term in dnf.iter().flatten() {
                if seen.insert(term.clone()) {
                    terms.push(regex::escape(term));
                }
            }
            terms.join("|")
        } else {
            regex::escape(raw_query)
        }
    };
    regex::RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .ok()
}

/// Group raw events per file (first-seen order) and per line
fn group_events(events: Vec<LineEvent>) -> Vec<(String, BTreeMap<usize, LineEntry>)> {
    let mut order = Vec::new();
    let mut by_file: HashMap<String, BTreeMap<usize, LineEntry>> = HashMap::new();
    for event in events {
        let path = event.path().replace('\\', "/");
        let path = path.trim_start_matches("./").to_string();
        if !by_file.contains_key(&path) {
            order.push(path.clone());
        }
        let lines = by_file.entry(path).or_default();
        match event {
            LineEvent::Match {
                line_number,
                text,
                submatch,
                ..
            } => {
                lines.insert(
                    line_number,
                    LineEntry {
                        text,
                        is_match: true,
                        submatch,
                    },
                );
            }
            LineEvent::Context {
                line_number, text, ..
            } => {
                lines.entry(line_number).or_insert(LineEntry {
                    text,
                    is_match: false,
                    submatch: None,
                });
            }
        }
    }
    order
        .into_iter()
        .filter_map(|path| by_file.remove(&path).map(|lines| (path, lines)))
        .collect()
}

fn clean_line(text: &str) -> String {
    text.trim_end_matches('\n').trim_end_matches('\r').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::NativeMatcher;
    use std::fs;
    use tempfile::TempDir;

    fn write_bgb(dir: &Path) {
        let mut content = String::from("# Bürgerliches Gesetzbuch\n");
        for n in 2..=40 {
            content.push_str(&format!("Zeile {}\n", n));
        }
        content.push_str("## Mietrecht\n"); // line 41
        content.push_str("§ 573 Kündigung durch den Vermieter\n"); // line 42
        content.push_str("Absatz 1\n"); // line 43
        content.push_str("Ende\n");
        fs::create_dir_all(dir.join("gesetze")).unwrap();
        fs::write(dir.join("gesetze/bgb.md"), content).unwrap();
    }

    fn engine_over(dir: &Path) -> SearchEngine {
        let sandbox = Arc::new(Sandbox::new(dir).unwrap());
        let mut config = Config::default();
        config.corpus.root = dir.to_path_buf();
        SearchEngine::new(Arc::new(config), sandbox, Box::new(NativeMatcher)).unwrap()
    }

    #[tokio::test]
    async fn test_single_file_hit_with_context() {
        let dir = TempDir::new().unwrap();
        write_bgb(dir.path());
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "Kündigung".to_string(),
                file_list: Some(vec!["gesetze/bgb.md".to_string()]),
                max_results: None,
                context_lines: Some(1),
                regex: false,
                case_sensitive: false,
            })
            .await;

        assert!(response.error.is_none());
        assert_eq!(response.matches.len(), 1);
        let hit = &response.matches[0];
        assert_eq!(hit.file, "gesetze/bgb.md");
        assert_eq!(hit.line, 42);
        assert_eq!(hit.text, "§ 573 Kündigung durch den Vermieter");
        assert_eq!(hit.section.as_deref(), Some("## Mietrecht"));

        let rows: Vec<usize> = hit.context.iter().map(|r| r.line_number).collect();
        assert_eq!(rows, vec![41, 42, 43]);
        assert!(hit.context[1].is_match);
        assert!(!hit.context[0].is_match);

        // the byte range points exactly at the matched substring
        let bytes = fs::read(dir.path().join("gesetze/bgb.md")).unwrap();
        let [start, end] = hit.byte_range;
        assert_eq!(
            &bytes[start as usize..end as usize],
            "Kündigung".as_bytes()
        );
    }

    #[tokio::test]
    async fn test_highlighting_wraps_terms() {
        let dir = TempDir::new().unwrap();
        write_bgb(dir.path());
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "Kündigung".to_string(),
                file_list: None,
                max_results: None,
                context_lines: Some(0),
                regex: false,
                case_sensitive: false,
            })
            .await;
        assert_eq!(
            response.matches[0].highlighted,
            "§ 573 **Kündigung** durch den Vermieter"
        );
    }

    #[tokio::test]
    async fn test_year_descending_order() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("urteile")).unwrap();
        fs::write(dir.path().join("urteile/bgh_2019.md"), "Kündigung alt\n").unwrap();
        fs::write(dir.path().join("urteile/bgh_2023.md"), "Kündigung neu\n").unwrap();
        fs::write(dir.path().join("uebersicht.md"), "Kündigung Index\n").unwrap();
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "Kündigung".to_string(),
                file_list: None,
                max_results: None,
                context_lines: Some(0),
                regex: false,
                case_sensitive: false,
            })
            .await;

        let files: Vec<&str> = response.matches.iter().map(|m| m.file.as_str()).collect();
        assert_eq!(
            files,
            vec!["uebersicht.md", "urteile/bgh_2023.md", "urteile/bgh_2019.md"]
        );
    }

    #[tokio::test]
    async fn test_boolean_query_restricts_to_conjunction() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("doc.md"),
            "Kündigung ohne Frist\nKündigung durch den Vermieter\nnur Vermieter\n",
        )
        .unwrap();
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "Kündigung AND Vermieter".to_string(),
                file_list: None,
                max_results: None,
                context_lines: Some(0),
                regex: false,
                case_sensitive: false,
            })
            .await;

        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].line, 2);
    }

    #[tokio::test]
    async fn test_or_query_matches_either_term() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("doc.md"), "BGB gilt\nZPO gilt\nStGB gilt\n").unwrap();
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "BGB OR ZPO".to_string(),
                file_list: None,
                max_results: None,
                context_lines: Some(0),
                regex: false,
                case_sensitive: false,
            })
            .await;

        let lines: Vec<usize> = response.matches.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_matcher_binary_returns_error_payload() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("doc.md"), "Inhalt\n").unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path()).unwrap());
        let mut config = Config::default();
        config.corpus.root = dir.path().to_path_buf();
        let engine = SearchEngine::new(
            Arc::new(config),
            sandbox,
            Box::new(RipgrepMatcher::with_binary("rg-definitely-not-installed")),
        )
        .unwrap();

        let response = engine
            .search_lines(&SearchRequest {
                query: "Inhalt".to_string(),
                file_list: None,
                max_results: None,
                context_lines: None,
                regex: false,
                case_sensitive: false,
            })
            .await;

        assert!(response.matches.is_empty());
        let message = response.error.unwrap();
        assert!(message.contains("not found on PATH"), "{}", message);
    }

    #[tokio::test]
    async fn test_repeated_searches_are_idempotent() {
        let dir = TempDir::new().unwrap();
        write_bgb(dir.path());
        let engine = engine_over(dir.path());
        let request = SearchRequest {
            query: "Zeile".to_string(),
            file_list: None,
            max_results: Some(5),
            context_lines: Some(1),
            regex: false,
            case_sensitive: false,
        };

        let first = engine.search_lines(&request).await;
        let second = engine.search_lines(&request).await;
        let summary = |r: &SearchResponse| {
            r.matches
                .iter()
                .map(|m| (m.file.clone(), m.line, m.byte_range))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.matches.len(), 5);
    }

    #[tokio::test]
    async fn test_directory_entry_expands_and_bad_entries_skip() {
        let dir = TempDir::new().unwrap();
        write_bgb(dir.path());
        let engine = engine_over(dir.path());

        let response = engine
            .search_lines(&SearchRequest {
                query: "Kündigung".to_string(),
                file_list: Some(vec![
                    "gesetze/".to_string(),
                    "../escape.md".to_string(),
                    "fehlt.md".to_string(),
                ]),
                max_results: None,
                context_lines: Some(0),
                regex: false,
                case_sensitive: false,
            })
            .await;

        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].file, "gesetze/bgb.md");
    }
}
