//! Error types for the Schwab MCP server
//!
//! A closed set of tagged variants so callers branch on kind instead of
//! string-matching messages. Messages never carry credential material.

use std::io;

use thiserror::Error;

/// Result type alias for the Schwab MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Schwab MCP server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential has ever been loaded; the user must authenticate
    /// out-of-band before the server can talk to the API.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Token refresh rejected, or an authenticated call rejected with
    /// 401/403 after the single forced re-authentication.
    #[error("Authentication failed (HTTP {status}): {message}")]
    AuthFailure {
        /// Upstream HTTP status
        status: u16,
        /// Sanitized upstream message
        message: String,
    },

    /// Upstream returned 429
    #[error("Rate limited by upstream (HTTP 429)")]
    RateLimited {
        /// Retry-After hint in seconds, when the upstream provided one
        retry_after: Option<u64>,
    },

    /// Upstream returned 404 (typically an unknown symbol or account)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-2xx upstream response
    #[error("Upstream error (HTTP {status}): {message}")]
    UpstreamFailure {
        /// Upstream HTTP status
        status: u16,
        /// Sanitized upstream message
        message: String,
    },

    /// 2xx response whose body could not be decoded
    #[error("Failed to decode upstream response: {0}")]
    DecodeFailure(String),

    /// Network call exceeded its deadline
    #[error("Request timed out: {0}")]
    TimeoutFailure(String),

    /// Network-level failure before an HTTP status was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error on the MCP wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable kind tag used when rendering structured tool errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::AuthFailure { .. } => "auth_failure",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::DecodeFailure(_) => "decode_failure",
            Self::TimeoutFailure(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::NotFound(_) => -32001,
            Self::Unauthenticated(_) | Self::AuthFailure { .. } => -32002,
            Self::RateLimited { .. } => -32003,
            Self::TimeoutFailure(_) | Self::Transport(_) | Self::UpstreamFailure { .. } => -32000,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}
