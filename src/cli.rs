//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Read-only Schwab brokerage MCP server
#[derive(Parser, Debug)]
#[command(name = "schwab-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "SCHWAB_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "SCHWAB_MCP_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "SCHWAB_MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional, defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server on stdio (default)
    Serve,

    /// Exchange an OAuth authorization redirect for the initial token.
    ///
    /// Visit the Schwab authorization URL in a browser, approve access, and
    /// paste the full redirect URL you land on (it contains `?code=...`).
    Auth {
        /// Redirect URL from the browser address bar after approval
        #[arg(required = true)]
        redirect_url: String,
    },
}
