//! # Tool Server Module
//!
//! ## Purpose
//! Line-delimited JSON-RPC dispatcher over stdio exposing the four public
//! operations (`search_rg`, `file_search`, `read_file_range`, `list_paths`)
//! to an agent orchestration loop running in another process.
//!
//! ## Input/Output Specification
//! - **Input**: One JSON-RPC request object per line:
//!   `{"jsonrpc": "2.0", "id": 1, "method": "call_tool",
//!     "params": {"tool": "...", "args": {...}}}`
//! - **Output**: One JSON-RPC response object per line, result or error
//! - **Protocol**: malformed request lines are skipped; failed tool calls
//!   answer with error code -32000, unknown methods with -32601
//!
//! ## Key Features
//! - `ping` method for liveness checks
//! - `read_file_range` accepts either a byte range or a line number with a
//!   context window

use crate::errors::{Result, SearchError};
use crate::file_search::FileSearchRequest;
use crate::reader::RangeReader;
use crate::search::{SearchEngine, SearchRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Stdio JSON-RPC server around the search engine
pub struct ToolServer {
    engine: Arc<SearchEngine>,
    reader: Arc<RangeReader>,
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Deserialize)]
struct CallToolParams {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Byte- or line-addressed read arguments
#[derive(Deserialize)]
struct ReadArgs {
    path: String,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
    #[serde(default)]
    context: Option<u64>,
    #[serde(default)]
    max_lines: Option<usize>,
    #[serde(default)]
    line_number: Option<usize>,
    #[serde(default)]
    context_lines: Option<usize>,
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default = "default_subdir")]
    subdir: String,
}

fn default_subdir() -> String {
    ".".to_string()
}

impl ToolServer {
    pub fn new(engine: Arc<SearchEngine>, reader: Arc<RangeReader>) -> Self {
        Self { engine, reader }
    }

    /// Serve line-delimited JSON-RPC over stdin/stdout until EOF
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(line).await else {
                continue;
            };
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }
        Ok(())
    }

    /// Handle one request line; unparseable lines yield no response
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: RpcRequest = serde_json::from_str(line).ok()?;
        Some(self.handle_request(request).await)
    }

    async fn handle_request(&self, request: RpcRequest) -> Value {
        let id = request.id.unwrap_or(Value::Null);
        match request.method.as_deref() {
            Some("call_tool") => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => return rpc_error(id, -32602, &format!("Invalid params: {}", e)),
                    };
                tracing::debug!("dispatching tool call: {}", params.tool);
                match self.dispatch_tool(&params.tool, params.args).await {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err(e) => rpc_error(id, -32000, &e.to_string()),
                }
            }
            Some("ping") => json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}}),
            _ => rpc_error(id, -32601, "Method not found"),
        }
    }

    async fn dispatch_tool(&self, tool: &str, args: Value) -> Result<Value> {
        // absent args behave like an empty object
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        match tool {
            "search_rg" => {
                let request: SearchRequest = serde_json::from_value(args)?;
                let response = self.engine.search_lines(&request).await;
                Ok(serde_json::to_value(response)?)
            }
            "file_search" => {
                let request: FileSearchRequest = serde_json::from_value(args)?;
                let response = self.engine.search_files(&request).await;
                Ok(serde_json::to_value(response)?)
            }
            "read_file_range" => {
                let args: ReadArgs = serde_json::from_value(args)?;
                let read = if let Some(line_number) = args.line_number {
                    let context_lines = args.context_lines.unwrap_or(2);
                    self.reader
                        .read_file_lines(&args.path, line_number, context_lines, args.max_lines)
                        .await?
                } else {
                    let (start, end) = match (args.start, args.end) {
                        (Some(start), Some(end)) => (start, end),
                        _ => {
                            return Err(SearchError::InvalidSearchQuery {
                                query: args.path,
                                reason: "read_file_range needs start/end or line_number"
                                    .to_string(),
                            })
                        }
                    };
                    self.reader
                        .read_file_range(&args.path, start, end, args.context, args.max_lines)
                        .await?
                };
                Ok(serde_json::to_value(read)?)
            }
            "list_paths" => {
                let args: ListArgs = serde_json::from_value(args)?;
                let files = self.engine.sandbox.list_paths(&args.subdir)?;
                Ok(json!({ "files": files }))
            }
            other => Err(SearchError::Internal {
                message: format!("Unknown tool: {}", other),
            }),
        }
    }
}

fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::matcher::NativeMatcher;
    use crate::sandbox::Sandbox;
    use std::fs;
    use tempfile::TempDir;

    fn server_over(dir: &std::path::Path) -> ToolServer {
        let sandbox = Arc::new(Sandbox::new(dir).unwrap());
        let mut config = Config::default();
        config.corpus.root = dir.to_path_buf();
        let config = Arc::new(config);
        let engine = Arc::new(
            SearchEngine::new(config.clone(), sandbox.clone(), Box::new(NativeMatcher)).unwrap(),
        );
        let reader = Arc::new(RangeReader::new(sandbox, config));
        ToolServer::new(engine, reader)
    }

    fn corpus() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("gesetze")).unwrap();
        fs::write(
            dir.path().join("gesetze/bgb.md"),
            "# BGB\n§ 573 Kündigung durch den Vermieter\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response["result"]["ok"], true);
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_call_tool_search_rg() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"call_tool","params":{"tool":"search_rg","args":{"query":"Kündigung"}}}"#,
            )
            .await
            .unwrap();
        let matches = response["result"]["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["file"], "gesetze/bgb.md");
        assert_eq!(matches[0]["line"], 2);
    }

    #[tokio::test]
    async fn test_call_tool_read_by_line() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"call_tool","params":{"tool":"read_file_range","args":{"path":"gesetze/bgb.md","line_number":2,"context_lines":1}}}"#,
            )
            .await
            .unwrap();
        let text = response["result"]["text"].as_str().unwrap();
        assert!(text.contains("Kündigung"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_rpc_error() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"call_tool","params":{"tool":"elasticsearch_search","args":{}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn test_breakout_surfaces_as_rpc_error() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"call_tool","params":{"tool":"read_file_range","args":{"path":"../secrets.txt","start":0,"end":10}}}"#,
            )
            .await
            .unwrap();
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("breakout"));
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let dir = corpus();
        let server = server_over(dir.path());
        assert!(server.handle_line("not json at all").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":6,"method":"shutdown"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_list_paths_defaults_to_root() {
        let dir = corpus();
        let server = server_over(dir.path());
        let response = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":7,"method":"call_tool","params":{"tool":"list_paths","args":{}}}"#,
            )
            .await
            .unwrap();
        let files = response["result"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
    }
}
