//! hanzo-mcp: inspect configured MCP servers and call their tools
//!
//! Servers are read from `~/.hanzo/mcp-servers.toml` unless `--config` points
//! elsewhere. Logs go to stderr so command output stays machine-readable.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hanzo_mcp::client::{FailurePolicy, ToolRegistry};
use hanzo_mcp::{FileConfigSource, Tool};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hanzo-mcp")]
#[command(about = "Inspect MCP servers and call their tools", version)]
struct Cli {
    /// Server configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Skip servers that fail to connect instead of stopping
    #[arg(long, global = true)]
    continue_on_error: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show connection status for every configured server
    Status,
    /// List available tools
    Tools {
        /// Only tools owned by this server
        #[arg(short, long)]
        server: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a tool and print its result
    Call {
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
    /// Call a tool and print streamed chunks as they arrive
    Stream {
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let path = match cli.config {
        Some(path) => path,
        None => FileConfigSource::default_path()
            .context("cannot determine home directory, pass --config")?,
    };
    info!(path = %path.display(), "Using MCP server configuration");

    let policy = if cli.continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::FailFast
    };
    let registry =
        ToolRegistry::with_transports(Arc::new(FileConfigSource::new(path))).with_failure_policy(policy);

    if let Err(e) = registry.initialize().await {
        warn!(error = %e, "MCP initialization incomplete");
    }

    let outcome = run(&registry, cli.command).await;
    registry.dispose().await;
    outcome
}

async fn run(registry: &ToolRegistry, command: Command) -> Result<()> {
    match command {
        Command::Status => {
            println!("{}", registry.status_text());
            for server in registry.server_names().await {
                let tools = registry.tools_for_server(&server).await;
                println!("  {}: {} tool(s)", server, tools.len());
            }
            Ok(())
        }
        Command::Tools { server, json } => {
            let tools = match &server {
                Some(name) => registry.tools_for_server(name).await,
                None => registry.get_available_tools().await,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else if tools.is_empty() {
                println!("No tools available ({})", registry.status_text());
            } else {
                tools.iter().for_each(print_tool);
            }
            Ok(())
        }
        Command::Call { tool, args } => {
            let arguments = parse_args(&args)?;
            let result = registry.call_tool(&tool, arguments).await;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "tool call failed".to_string()));
            }

            match result.data {
                Some(Value::String(text)) => println!("{}", text),
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => {}
            }
            Ok(())
        }
        Command::Stream { tool, args } => {
            let arguments = parse_args(&args)?;
            let handle = registry
                .call_tool_stream(&tool, arguments, |chunk| match chunk {
                    Value::String(text) => println!("{}", text),
                    other => println!("{}", other),
                })
                .await?;

            let cancel = handle.canceller();
            tokio::select! {
                result = handle.finished() => result?,
                _ = tokio::signal::ctrl_c() => {
                    cancel();
                    warn!(tool = %tool, "Interrupted, call cancelled");
                }
            }
            Ok(())
        }
    }
}

fn print_tool(tool: &Tool) {
    println!("{} [{}]", tool.name, tool.owner_server);
    if tool.description != tool.name {
        println!("    {}", tool.description);
    }
}

fn parse_args(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--args is not valid JSON: {}", raw))
}
