//! # Range Reader Module
//!
//! ## Purpose
//! Returns UTF-8 decoded snippets around byte ranges or line positions,
//! clamped to file bounds, with symmetric context padding and a line cap.
//!
//! ## Input/Output Specification
//! - **Input**: Sandbox-relative path plus either a byte range or a line
//!   number with a context window
//! - **Output**: `{path, start, end, text}` where `start`/`end` are the
//!   clamped, padded offsets actually used and `text` is the decoded slice
//! - **Contract**: best available slice, never the exact requested slice —
//!   out-of-range offsets clamp silently, invalid UTF-8 decodes with
//!   replacement characters
//!
//! ## Key Features
//! - `max_lines` truncation keeps line terminators and recomputes `end` so
//!   `end == start + byte_len(text)` still holds
//! - The line-addressed variant derives its byte window from the sandbox's
//!   line-offset index and delegates to the same clamped-read logic

use crate::config::Config;
use crate::errors::Result;
use crate::sandbox::Sandbox;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One decoded slice of a corpus file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRead {
    pub path: String,
    pub start: u64,
    pub end: u64,
    pub text: String,
}

/// Reads clamped, padded byte ranges out of sandboxed files
pub struct RangeReader {
    sandbox: Arc<Sandbox>,
    config: Arc<Config>,
}

impl RangeReader {
    pub fn new(sandbox: Arc<Sandbox>, config: Arc<Config>) -> Self {
        Self { sandbox, config }
    }

    /// Read a UTF-8 decoded slice around a byte range.
    ///
    /// `context` defaults to the configured `context_bytes` and pads both
    /// bounds symmetrically. `max_lines` defaults to the configured line cap;
    /// pass `Some(0)` to disable truncation.
    pub async fn read_file_range(
        &self,
        path: &str,
        start: u64,
        end: u64,
        context: Option<u64>,
        max_lines: Option<usize>,
    ) -> Result<RangeRead> {
        let abs = self.sandbox.resolve_inside(path)?;
        let context = context.unwrap_or(self.config.search.context_bytes as u64);
        let padded_start = start.saturating_sub(context);
        let padded_end = end.saturating_add(context);
        self.clamped_read(path, &abs, padded_start, padded_end, max_lines)
            .await
    }

    /// Line-addressed variant: read the lines around a 1-based line number.
    ///
    /// The byte window is derived from the sandbox's line index, then handed
    /// to the same clamped-read logic with no extra byte padding.
    pub async fn read_file_lines(
        &self,
        path: &str,
        line_number: usize,
        context_lines: usize,
        max_lines: Option<usize>,
    ) -> Result<RangeRead> {
        let abs = self.sandbox.resolve_inside(path)?;
        let first_line = line_number.saturating_sub(context_lines).max(1);
        let last_line = line_number.saturating_add(context_lines);
        let start = self.sandbox.line_start_offset(&abs, first_line)?;
        let line_count = self.sandbox.line_count(&abs)?;
        let end = if last_line >= line_count {
            tokio::fs::metadata(&abs).await?.len()
        } else {
            self.sandbox.line_start_offset(&abs, last_line + 1)?
        };
        self.clamped_read(path, &abs, start, end, max_lines).await
    }

    async fn clamped_read(
        &self,
        path: &str,
        abs: &Path,
        start: u64,
        end: u64,
        max_lines: Option<usize>,
    ) -> Result<RangeRead> {
        let bytes = tokio::fs::read(abs).await?;
        let len = bytes.len() as u64;
        // clamp start first so a degenerate range collapses instead of raising
        let start = start.min(len);
        let end = end.max(start).min(len);
        let mut text =
            String::from_utf8_lossy(&bytes[start as usize..end as usize]).into_owned();
        let mut end = end;

        let max_lines = max_lines.unwrap_or(self.config.search.max_lines);
        if max_lines > 0 {
            let truncated: String = text.split_inclusive('\n').take(max_lines).collect();
            if truncated.len() < text.len() {
                text = truncated;
                end = start + text.len() as u64;
            }
        }

        Ok(RangeRead {
            path: path.to_string(),
            start,
            end,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    fn reader_over(content: &str) -> (TempDir, RangeReader) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("doc.md"), content).unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path()).unwrap());
        let mut config = Config::default();
        config.corpus.root = dir.path().to_path_buf();
        let reader = RangeReader::new(sandbox, Arc::new(config));
        (dir, reader)
    }

    #[tokio::test]
    async fn test_exact_slice_with_zero_context() {
        let (_dir, reader) = reader_over("erste\nzweite\ndritte\n");
        let read = reader
            .read_file_range("doc.md", 6, 12, Some(0), Some(0))
            .await
            .unwrap();
        assert_eq!(read.text, "zweite");
        assert_eq!(read.start, 6);
        assert_eq!(read.end, 12);
    }

    #[tokio::test]
    async fn test_symmetric_context_padding() {
        let (_dir, reader) = reader_over("erste\nzweite\ndritte\n");
        let read = reader
            .read_file_range("doc.md", 6, 12, Some(3), Some(0))
            .await
            .unwrap();
        assert_eq!(read.start, 3);
        assert_eq!(read.end, 15);
        assert_eq!(read.text, "te\nzweite\ndr");
    }

    #[tokio::test]
    async fn test_out_of_range_offsets_clamp() {
        let (_dir, reader) = reader_over("kurz\n");
        let read = reader
            .read_file_range("doc.md", 9999, 99999, Some(0), Some(0))
            .await
            .unwrap();
        assert_eq!(read.start, 5);
        assert_eq!(read.end, 5);
        assert_eq!(read.text, "");

        // end before start collapses rather than raising
        let read = reader
            .read_file_range("doc.md", 4, 1, Some(0), Some(0))
            .await
            .unwrap();
        assert_eq!(read.start, 4);
        assert_eq!(read.end, 4);
    }

    #[tokio::test]
    async fn test_max_lines_truncation_recomputes_end() {
        let content = "eins\nzwei\ndrei\nvier\nfünf\n";
        let (_dir, reader) = reader_over(content);
        let read = reader
            .read_file_range("doc.md", 0, content.len() as u64, Some(0), Some(2))
            .await
            .unwrap();
        assert_eq!(read.text, "eins\nzwei\n");
        assert_eq!(read.end, read.start + read.text.len() as u64);
    }

    #[tokio::test]
    async fn test_line_addressed_window() {
        let (_dir, reader) = reader_over("eins\nzwei\ndrei\nvier\nfünf\n");
        let read = reader
            .read_file_lines("doc.md", 3, 1, Some(0))
            .await
            .unwrap();
        assert_eq!(read.text, "zwei\ndrei\nvier\n");
        assert_eq!(read.start, 5);
    }

    #[tokio::test]
    async fn test_line_window_clamps_at_file_edges() {
        let (_dir, reader) = reader_over("eins\nzwei\n");
        let read = reader
            .read_file_lines("doc.md", 1, 5, Some(0))
            .await
            .unwrap();
        assert_eq!(read.text, "eins\nzwei\n");
        assert_eq!(read.start, 0);
        assert_eq!(read.end, 10);
    }

    #[tokio::test]
    async fn test_breakout_is_rejected() {
        let (_dir, reader) = reader_over("geheim\n");
        let err = reader
            .read_file_range("../outside.txt", 0, 10, Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::SearchError::PathBreakout { .. }));
    }
}
