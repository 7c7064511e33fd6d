//! Schwab MCP Server Library
//!
//! Exposes read-only Charles Schwab brokerage data (positions, balances,
//! quotes, option chains, price history) as MCP tools over stdio.
//!
//! The core of the crate is the OAuth credential lifecycle:
//!
//! - [`auth::TokenStore`] keeps a single rotating refresh-token session valid
//!   across restarts, with a single-flight refresh gate.
//! - [`client::SchwabClient`] wraps every outbound call with a valid bearer
//!   token and classifies failures into a closed error taxonomy.
//!
//! No mutating verb is reachable from tool handlers; the client's public
//! surface only issues GET requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs are written to stderr: stdout carries the MCP wire protocol.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
