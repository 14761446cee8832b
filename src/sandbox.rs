//! # Sandbox Module
//!
//! ## Purpose
//! Restricts all filesystem operations to a fixed corpus root and exposes
//! helpers for listing allowed files and translating line numbers to absolute
//! byte offsets for precise slicing.
//!
//! ## Input/Output Specification
//! - **Input**: Relative paths from callers, line numbers
//! - **Output**: Resolved absolute paths inside the root, POSIX-style relative
//!   listings, byte offsets
//! - **Security**: Any resolved path outside the root is rejected with
//!   `SearchError::PathBreakout` before any filesystem access happens
//!
//! ## Key Features
//! - Segment-wise containment check (a sibling directory sharing a string
//!   prefix with the root does not pass)
//! - Extension allowlist (`.txt`, `.md`) applied to listing and search targets
//! - Lazy per-file line-offset cache, shared for the process lifetime; the
//!   corpus is assumed immutable while the process runs

use crate::errors::{Result, SearchError};
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// File extensions the sandbox will list and search
pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Restricts filesystem operations to a fixed root
pub struct Sandbox {
    root: PathBuf,
    line_offsets: DashMap<PathBuf, Arc<Vec<u64>>>,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`. The root must exist; it is resolved
    /// to a canonical absolute path once.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| SearchError::Config {
            message: format!("Corpus root {:?} is not accessible: {}", root.as_ref(), e),
        })?;
        Ok(Self {
            root,
            line_offsets: DashMap::new(),
        })
    }

    /// The canonical sandbox root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the sandbox.
    ///
    /// Symlinks and `..` components are resolved before the containment
    /// check, which compares path segments rather than string prefixes.
    pub fn resolve_inside(&self, relative_path: &str) -> Result<PathBuf> {
        let candidate = self.root.join(relative_path);
        let resolved = match candidate.canonicalize() {
            Ok(p) => p,
            // Nonexistent targets are still checked lexically so traversal
            // components cannot slip through
            Err(_) => normalize_lexically(&candidate),
        };
        if !resolved.starts_with(&self.root) {
            return Err(SearchError::PathBreakout {
                path: relative_path.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Whether a path carries an allowed corpus extension
    pub fn is_allowed_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                ALLOWED_EXTENSIONS.iter().any(|a| *a == e)
            })
            .unwrap_or(false)
    }

    /// List allowed files below a subdirectory as POSIX-style relative paths.
    ///
    /// No ordering guarantee beyond filesystem traversal order; callers that
    /// need determinism must sort.
    pub fn list_paths(&self, subdir: &str) -> Result<Vec<String>> {
        let base = self.resolve_inside(subdir)?;
        let mut results = Vec::new();
        for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !Self::is_allowed_file(entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                results.push(to_posix(rel));
            }
        }
        Ok(results)
    }

    /// Absolute byte offset of the first byte of a 1-based line.
    ///
    /// The line number is clamped into `[1, line_count]`; an empty file still
    /// yields offset 0. `path` must already be sandbox-resolved.
    pub fn line_start_offset(&self, path: &Path, line_number: usize) -> Result<u64> {
        let offsets = self.line_offsets_for(path)?;
        let mut line = line_number.max(1);
        if line >= offsets.len() {
            line = offsets.len() - 1;
        }
        Ok(offsets[line])
    }

    /// Number of lines in a file, from the same cache as the offsets
    pub fn line_count(&self, path: &Path) -> Result<usize> {
        Ok(self.line_offsets_for(path)?.len() - 1)
    }

    fn line_offsets_for(&self, path: &Path) -> Result<Arc<Vec<u64>>> {
        if let Some(cached) = self.line_offsets.get(path) {
            return Ok(cached.clone());
        }
        let bytes = std::fs::read(path)?;
        // offsets[line_number] = byte start of that line; index 0 is a
        // placeholder so 1-based line numbers index directly
        let mut offsets: Vec<u64> = vec![0];
        let mut byte_index = 0u64;
        for span in line_spans(&bytes) {
            offsets.push(byte_index);
            byte_index += span.len() as u64;
        }
        if offsets.len() == 1 {
            offsets.push(0);
        }
        let offsets = Arc::new(offsets);
        self.line_offsets.insert(path.to_path_buf(), offsets.clone());
        Ok(offsets)
    }
}

/// Split raw bytes into lines, keeping the terminator with each line so the
/// cumulative lengths reproduce exact byte offsets
fn line_spans(bytes: &[u8]) -> Vec<&[u8]> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            spans.push(&bytes[start..=i]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        spans.push(&bytes[start..]);
    }
    spans
}

/// Collapse `.` and `..` components without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
