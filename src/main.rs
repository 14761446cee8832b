//! # Legal Sandbox Server Main Driver
//!
//! ## Purpose
//! Entry point for the sandboxed search engine. Wires configuration, the
//! sandbox, and the search engine, then either serves JSON-RPC on stdio for
//! an agent process or runs a single tool invocation from the command line.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//!   variables (`LEGAL_DOC_ROOT`)
//! - **Output**: JSON tool results on stdout; logs on stderr
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing (stderr, so stdout stays protocol-clean)
//! 3. Initialize sandbox, search engine, and range reader
//! 4. Serve stdio JSON-RPC or dispatch the requested subcommand

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use legal_sandbox_search::{
    config::Config,
    errors::{Result, SearchError},
    file_search::FileSearchRequest,
    search::SearchRequest,
    AppState, ToolServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("legal-sandbox-server")
        .version("1.0.0")
        .author("Legal Search Team")
        .about("Sandboxed search and retrieval over a legal document corpus")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(Command::new("serve").about("Serve line-delimited JSON-RPC on stdio"))
        .subcommand(
            Command::new("search")
                .about("Line search across the corpus")
                .arg(Arg::new("query").long("query").required(true))
                .arg(
                    Arg::new("file")
                        .long("file")
                        .action(ArgAction::Append)
                        .help("Restrict to files, directories, or glob patterns"),
                )
                .arg(
                    Arg::new("max-results")
                        .long("max-results")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("context-lines")
                        .long("context-lines")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("regex")
                        .long("regex")
                        .action(ArgAction::SetTrue)
                        .help("Treat the query as a regex pattern"),
                )
                .arg(
                    Arg::new("case-sensitive")
                        .long("case-sensitive")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("read")
                .about("Read a byte range from a file with optional context")
                .arg(Arg::new("path").long("path").required(true))
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("line-number")
                        .long("line-number")
                        .value_parser(clap::value_parser!(usize))
                        .help("Line-addressed read instead of a byte range"),
                )
                .arg(
                    Arg::new("context")
                        .long("context")
                        .value_parser(clap::value_parser!(u64))
                        .help("Extra bytes of context on both sides"),
                )
                .arg(
                    Arg::new("context-lines")
                        .long("context-lines")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("max-lines")
                        .long("max-lines")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List allowed files under a subdirectory")
                .arg(Arg::new("subdir").long("subdir").default_value(".")),
        )
        .subcommand(
            Command::new("files")
                .about("Return files whose contents match a boolean query")
                .arg(Arg::new("query").long("query"))
                .arg(Arg::new("glob").long("glob"))
                .arg(
                    Arg::new("case-sensitive")
                        .long("case-sensitive")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("max-results")
                        .long("max-results")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = Config::from_file(config_path.unwrap_or("config.toml"))?;
    init_logging(&config)?;

    info!("Corpus root: {:?}", config.corpus.root);
    let state = AppState::initialize(config)?;

    match matches.subcommand() {
        Some(("serve", _)) => {
            info!("Serving JSON-RPC on stdio");
            let server = ToolServer::new(state.engine.clone(), state.reader.clone());
            server.run_stdio().await?;
        }
        Some(("search", sub)) => {
            let request = SearchRequest {
                query: required_string(sub, "query"),
                file_list: sub
                    .get_many::<String>("file")
                    .map(|values| values.cloned().collect()),
                max_results: sub.get_one::<usize>("max-results").copied(),
                context_lines: sub.get_one::<usize>("context-lines").copied(),
                regex: sub.get_flag("regex"),
                case_sensitive: sub.get_flag("case-sensitive"),
            };
            let result = state.engine.search_lines(&request).await;
            print_wrapped("search_rg", json!({"query": request.query}), &result)?;
        }
        Some(("read", sub)) => {
            let path = required_string(sub, "path");
            let max_lines = sub.get_one::<usize>("max-lines").copied();
            let result = if let Some(line_number) = sub.get_one::<usize>("line-number") {
                let context_lines = sub.get_one::<usize>("context-lines").copied().unwrap_or(2);
                state
                    .reader
                    .read_file_lines(&path, *line_number, context_lines, max_lines)
                    .await?
            } else {
                let start = sub.get_one::<u64>("start").copied().ok_or_else(|| {
                    SearchError::InvalidSearchQuery {
                        query: path.clone(),
                        reason: "read needs --start/--end or --line-number".to_string(),
                    }
                })?;
                let end = sub.get_one::<u64>("end").copied().unwrap_or(start);
                let context = sub.get_one::<u64>("context").copied();
                state
                    .reader
                    .read_file_range(&path, start, end, context, max_lines)
                    .await?
            };
            print_wrapped("read_file_range", json!({"path": path}), &result)?;
        }
        Some(("list", sub)) => {
            let subdir = required_string(sub, "subdir");
            let files = state.sandbox.list_paths(&subdir)?;
            print_wrapped("list_paths", json!({"subdir": subdir}), &json!({"files": files}))?;
        }
        Some(("files", sub)) => {
            let request = FileSearchRequest {
                query: sub.get_one::<String>("query").cloned(),
                glob: sub.get_one::<String>("glob").cloned(),
                case_sensitive: sub.get_flag("case-sensitive"),
                max_results: sub.get_one::<usize>("max-results").copied(),
            };
            let result = state.engine.search_files(&request).await;
            print_wrapped("file_search", json!({"query": request.query}), &result)?;
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

fn required_string(matches: &ArgMatches, name: &str) -> String {
    matches
        .get_one::<String>(name)
        .cloned()
        .unwrap_or_default()
}

/// Print a tool result wrapped with its name and arguments, one JSON object
fn print_wrapped<T: serde::Serialize>(
    tool: &str,
    args: serde_json::Value,
    result: &T,
) -> Result<()> {
    let wrapped = json!({
        "tool": tool,
        "args": args,
        "result": serde_json::to_value(result)?,
    });
    println!("{}", serde_json::to_string_pretty(&wrapped)?);
    Ok(())
}

/// Initialize logging and tracing on stderr
fn init_logging(config: &Config) -> Result<()> {
    let level: tracing::Level =
        config
            .logging
            .level
            .parse()
            .map_err(|_| SearchError::Config {
                message: format!("Invalid log level: {}", config.logging.level),
            })?;
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .json()
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
    }

    Ok(())
}
