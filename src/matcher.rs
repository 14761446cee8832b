//! # Line Matcher Module
//!
//! ## Purpose
//! Abstracts the line-oriented matching backend behind a single trait with
//! two implementations: a subprocess adapter around ripgrep's JSON event
//! stream, and a native in-process scanner producing the same events for
//! portability and testing.
//!
//! ## Input/Output Specification
//! - **Input**: A compiled pattern, a sandboxed file list, context/case/cap
//!   options
//! - **Output**: A flat stream of match and context events with 1-based line
//!   numbers and, for matches, sub-match byte offsets within the line
//! - **Failure**: A missing ripgrep binary is a recoverable
//!   `MatcherUnavailable` error; unparseable event lines are skipped
//!
//! ## Key Features
//! - Both backends satisfy the same event contract, so the search engine is
//!   agnostic to which one is wired in
//! - Lookahead conjunctions are delegated to ripgrep's PCRE2 engine; the
//!   native scanner evaluates the DNF term sets directly, which is equivalent
//!   at single-line scope

use crate::errors::{Result, SearchError};
use crate::query::Dnf;
use crate::sandbox::Sandbox;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Compiled pattern handed to a matcher backend
#[derive(Debug, Clone)]
pub enum PatternSpec {
    /// Fixed-string search
    Literal(String),
    /// Plain regex (user regex mode or an OR alternation)
    Regex(String),
    /// Lookahead-conjunction pattern with its source DNF. The subprocess
    /// backend consumes `pattern` in PCRE2 mode; the native backend evaluates
    /// `dnf` directly.
    LookaheadDnf { pattern: String, dnf: Dnf },
}

/// One matching request over a resolved file set
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub pattern: PatternSpec,
    /// POSIX-style paths relative to the sandbox root, already validated
    pub files: Vec<String>,
    pub context_lines: usize,
    pub case_sensitive: bool,
    /// Per-file cap on reported matches
    pub max_count: usize,
}

/// One event from a matcher backend
#[derive(Debug, Clone)]
pub enum LineEvent {
    Match {
        path: String,
        line_number: usize,
        text: String,
        /// Byte offsets of the first sub-match within the line
        submatch: Option<(usize, usize)>,
    },
    Context {
        path: String,
        line_number: usize,
        text: String,
    },
}

impl LineEvent {
    pub fn path(&self) -> &str {
        match self {
            LineEvent::Match { path, .. } | LineEvent::Context { path, .. } => path,
        }
    }

    pub fn line_number(&self) -> usize {
        match self {
            LineEvent::Match { line_number, .. } | LineEvent::Context { line_number, .. } => {
                *line_number
            }
        }
    }
}

/// Backend-agnostic line matching contract
#[async_trait]
pub trait LineMatcher: Send + Sync {
    async fn run(&self, sandbox: &Sandbox, request: &MatchRequest) -> Result<Vec<LineEvent>>;
}

// ---------------------------------------------------------------------------
// Subprocess adapter
// ---------------------------------------------------------------------------

/// Shells out to ripgrep and parses its `--json` event stream
pub struct RipgrepMatcher {
    binary: String,
}

impl RipgrepMatcher {
    pub fn new() -> Self {
        Self {
            binary: "rg".to_string(),
        }
    }

    /// Use a non-default binary name, e.g. for tests
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for RipgrepMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineMatcher for RipgrepMatcher {
    async fn run(&self, sandbox: &Sandbox, request: &MatchRequest) -> Result<Vec<LineEvent>> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--json")
            .arg("--line-number")
            .arg("--with-filename")
            .arg("--color=never");
        if !request.case_sensitive {
            command.arg("-i");
        }
        if request.context_lines > 0 {
            command.arg("-C").arg(request.context_lines.to_string());
        }
        if request.max_count > 0 {
            command.arg("-m").arg(request.max_count.to_string());
        }
        let pattern = match &request.pattern {
            PatternSpec::Literal(p) => {
                command.arg("-F");
                p
            }
            PatternSpec::Regex(p) => p,
            PatternSpec::LookaheadDnf { pattern, .. } => {
                command.arg("-P");
                pattern
            }
        };
        command.arg("--").arg(pattern);
        for file in &request.files {
            command.arg(file);
        }
        command
            .current_dir(sandbox.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SearchError::MatcherUnavailable {
                    binary: self.binary.clone(),
                }
            } else {
                SearchError::Io(e)
            }
        })?;

        let stdout = child.stdout.take().ok_or_else(|| SearchError::Internal {
            message: "ripgrep stdout was not captured".to_string(),
        })?;

        let mut events = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(event) = parse_rg_event(&line) {
                events.push(event);
            }
        }

        let status = child.wait().await?;
        // Exit code 1 just means "no matches"; anything else is logged and
        // the partial event list is still returned
        if !status.success() && status.code() != Some(1) {
            tracing::warn!(
                "ripgrep exited with status {:?} for pattern {:?}",
                status.code(),
                pattern
            );
        }

        Ok(events)
    }
}

#[derive(Deserialize)]
struct RgEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct RgLineData {
    path: RgText,
    line_number: Option<u64>,
    lines: RgText,
    #[serde(default)]
    submatches: Vec<RgSubmatch>,
}

#[derive(Deserialize)]
struct RgText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct RgSubmatch {
    start: usize,
    end: usize,
}

/// Parse one ripgrep JSON event line; anything unusable yields `None`
fn parse_rg_event(line: &str) -> Option<LineEvent> {
    let envelope: RgEnvelope = serde_json::from_str(line).ok()?;
    if envelope.kind != "match" && envelope.kind != "context" {
        return None;
    }
    let data: RgLineData = serde_json::from_value(envelope.data).ok()?;
    let path = data.path.text?;
    let line_number = data.line_number? as usize;
    let text = data.lines.text?;
    if envelope.kind == "match" {
        let submatch = data.submatches.first().map(|sm| (sm.start, sm.end));
        Some(LineEvent::Match {
            path,
            line_number,
            text,
            submatch,
        })
    } else {
        Some(LineEvent::Context {
            path,
            line_number,
            text,
        })
    }
}

// ---------------------------------------------------------------------------
// Native scanner
// ---------------------------------------------------------------------------

/// In-process scanner emitting the same events as the subprocess adapter
pub struct NativeMatcher;

#[async_trait]
impl LineMatcher for NativeMatcher {
    async fn run(&self, sandbox: &Sandbox, request: &MatchRequest) -> Result<Vec<LineEvent>> {
        let tester = match MatchTester::compile(&request.pattern, request.case_sensitive) {
            Some(t) => t,
            None => {
                tracing::warn!("line pattern failed to compile, returning no matches");
                return Ok(Vec::new());
            }
        };

        let mut events = Vec::new();
        for rel in &request.files {
            let abs = match sandbox.resolve_inside(rel) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let bytes = match tokio::fs::read(&abs).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!("skipping unreadable file {}: {}", rel, e);
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text.split_inclusive('\n').collect();

            let mut match_lines = Vec::new();
            for (idx, raw_line) in lines.iter().enumerate() {
                if request.max_count > 0 && match_lines.len() >= request.max_count {
                    break;
                }
                let line = raw_line.trim_end_matches('\n').trim_end_matches('\r');
                if let Some(submatch) = tester.first_match(line) {
                    match_lines.push((idx + 1, submatch));
                }
            }
            if match_lines.is_empty() {
                continue;
            }

            let context = request.context_lines;
            let matched: std::collections::HashSet<usize> =
                match_lines.iter().map(|(n, _)| *n).collect();
            let mut wanted: std::collections::BTreeSet<usize> = std::collections::BTreeSet::new();
            for (line_number, _) in &match_lines {
                let start = line_number.saturating_sub(context).max(1);
                let end = (line_number + context).min(lines.len());
                for n in start..=end {
                    wanted.insert(n);
                }
            }

            for n in wanted {
                let text = lines[n - 1].to_string();
                if matched.contains(&n) {
                    let submatch = match_lines
                        .iter()
                        .find(|(ln, _)| *ln == n)
                        .map(|(_, sm)| *sm);
                    events.push(LineEvent::Match {
                        path: rel.clone(),
                        line_number: n,
                        text,
                        submatch,
                    });
                } else {
                    events.push(LineEvent::Context {
                        path: rel.clone(),
                        line_number: n,
                        text,
                    });
                }
            }
        }
        Ok(events)
    }
}

/// Compiled form of a pattern for the native scanner
enum MatchTester {
    Pattern(regex::Regex),
    Conjunctions {
        dnf: Vec<Vec<String>>,
        case_sensitive: bool,
    },
}

impl MatchTester {
    fn compile(pattern: &PatternSpec, case_sensitive: bool) -> Option<Self> {
        match pattern {
            PatternSpec::Literal(p) => regex::RegexBuilder::new(&regex::escape(p))
                .case_insensitive(!case_sensitive)
                .build()
                .ok()
                .map(MatchTester::Pattern),
            PatternSpec::Regex(p) => regex::RegexBuilder::new(p)
                .case_insensitive(!case_sensitive)
                .build()
                .ok()
                .map(MatchTester::Pattern),
            PatternSpec::LookaheadDnf { dnf, .. } => {
                let folded = dnf
                    .iter()
                    .map(|conj| {
                        conj.iter()
                            .map(|t| {
                                if case_sensitive {
                                    t.clone()
                                } else {
                                    t.to_lowercase()
                                }
                            })
                            .collect()
                    })
                    .collect();
                Some(MatchTester::Conjunctions {
                    dnf: folded,
                    case_sensitive,
                })
            }
        }
    }

    /// Byte offsets of the first sub-match within the line, if it matches
    fn first_match(&self, line: &str) -> Option<(usize, usize)> {
        match self {
            MatchTester::Pattern(re) => re.find(line).map(|m| (m.start(), m.end())),
            MatchTester::Conjunctions {
                dnf,
                case_sensitive,
            } => {
                let folded;
                let hay: &str = if *case_sensitive {
                    line
                } else {
                    folded = line.to_lowercase();
                    &folded
                };
                let satisfied = dnf
                    .iter()
                    .any(|conj| !conj.is_empty() && conj.iter().all(|term| hay.contains(term)));
                // A satisfied conjunction spans the whole line, mirroring how
                // the lookahead pattern matches
                satisfied.then_some((0, line.len()))
            }
        }
    }
}
