//! OAuth credential lifecycle for the Schwab API
//!
//! One rotating refresh-token session, persisted to a single owner-only
//! token file and kept valid behind a single-flight refresh gate.
//!
//! Features:
//! - Token persistence across restarts (JSON record, 0600 permissions)
//! - Refresh-token exchange with HTTP Basic client authentication
//! - Proactive refresh inside a configurable safety margin
//! - One in-flight refresh shared by all concurrent callers

mod store;
mod token;

pub use store::TokenStore;
pub use token::{Token, TokenResponse};
