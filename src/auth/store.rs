//! Token store - persistence, refresh, and the single-flight gate
//!
//! # Security
//!
//! The token file is owned exclusively by this store and written with
//! owner-only permissions. Token and client-secret values are never logged
//! and never included in error messages.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use parking_lot::RwLock;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::token::{Token, TokenResponse};
use crate::{Error, Result};

/// Manages the persisted OAuth credential and its refresh lifecycle.
///
/// All credential-affecting operations are serialized behind an internal
/// gate; callers that find the cached token still fresh never suspend.
pub struct TokenStore {
    /// HTTP client for token-endpoint requests
    http_client: Client,

    /// OAuth token endpoint URL
    token_url: String,

    /// OAuth client ID
    client_id: String,

    /// OAuth client secret
    client_secret: String,

    /// Path of the persisted token record
    token_path: PathBuf,

    /// Buffer before actual expiry at which the token is treated as expired
    safety_margin: Duration,

    /// Cached credential (read-mostly)
    cached: RwLock<Option<Token>>,

    /// Single-flight gate: at most one refresh round-trip at a time.
    /// Guards the outcome of the most recent attempt so waiters that queued
    /// while a refresh was in flight receive that refresh's failure instead
    /// of launching their own round-trip.
    refresh_gate: Mutex<RefreshCycle>,

    /// Count of completed refresh attempts. Read without the gate so a
    /// caller can tell whether an attempt finished while it was queued.
    refresh_attempts: AtomicU64,
}

/// Outcome of the most recent refresh attempt, held inside the gate
#[derive(Default)]
struct RefreshCycle {
    last_failure: Option<Error>,
}

impl TokenStore {
    /// Create a new token store
    #[must_use]
    pub fn new(
        http_client: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        token_path: PathBuf,
        safety_margin: Duration,
    ) -> Self {
        Self {
            http_client,
            token_url,
            client_id,
            client_secret,
            token_path,
            safety_margin,
            cached: RwLock::new(None),
            refresh_gate: Mutex::new(RefreshCycle::default()),
            refresh_attempts: AtomicU64::new(0),
        }
    }

    /// Path of the persisted token record
    #[must_use]
    pub fn token_path(&self) -> &PathBuf {
        &self.token_path
    }

    /// HTTP Basic authorization header value for the token endpoint
    fn basic_auth(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", BASE64.encode(credentials))
    }

    /// Load the persisted token record into the cache.
    ///
    /// An absent file yields `Ok(None)`; an unreadable or unparsable file is
    /// logged and treated as absent, leaving the file in place for manual
    /// recovery. Idempotent: the last successful load wins.
    pub fn load(&self) -> Result<Option<Token>> {
        if !self.token_path.exists() {
            debug!(path = %self.token_path.display(), "No stored token found");
            return Ok(None);
        }

        let content = match fs::read_to_string(&self.token_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.token_path.display(), error = %e, "Failed to read token file");
                return Ok(None);
            }
        };

        match serde_json::from_str::<Token>(&content) {
            Ok(token) => {
                debug!(
                    path = %self.token_path.display(),
                    expires_in = ?token.time_until_expiry(),
                    "Loaded stored token"
                );
                *self.cached.write() = Some(token.clone());
                Ok(Some(token))
            }
            Err(e) => {
                warn!(path = %self.token_path.display(), error = %e, "Failed to parse stored token");
                Ok(None)
            }
        }
    }

    /// Durably persist a token, then replace the in-memory cache.
    ///
    /// The write completes (or fails loudly) before the cache is touched, so
    /// a rotated refresh token can never live only in memory.
    pub fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(token)?;
        fs::write(&self.token_path, content)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.token_path, fs::Permissions::from_mode(0o600))?;
        }

        *self.cached.write() = Some(token.clone());
        debug!(path = %self.token_path.display(), "Saved token");
        Ok(())
    }

    /// Get a token guaranteed not to expire within the safety margin.
    ///
    /// Fresh cached tokens are returned without suspending. Expired or
    /// near-expiry tokens trigger a refresh behind the single-flight gate;
    /// every caller waiting on that gate receives the outcome of the one
    /// in-flight refresh, success or failure alike.
    pub async fn valid_token(&self) -> Result<Token> {
        if let Some(token) = self.cached_fresh() {
            return Ok(token);
        }

        let observed = self.refresh_attempts.load(Ordering::Acquire);
        let mut cycle = self.refresh_gate.lock().await;

        // A refresh that succeeded while we waited left a fresh cache.
        if let Some(token) = self.cached_fresh() {
            return Ok(token);
        }

        // A refresh that completed while we waited and did not leave a fresh
        // cache failed; deliver its failure rather than retrying.
        if self.refresh_attempts.load(Ordering::Acquire) != observed {
            if let Some(ref failure) = cycle.last_failure {
                return Err(shared_failure(failure));
            }
        }

        self.run_refresh(&mut cycle).await
    }

    /// Force a refresh exchange, serialized with any in-flight refresh.
    pub async fn refresh(&self) -> Result<Token> {
        let mut cycle = self.refresh_gate.lock().await;
        self.run_refresh(&mut cycle).await
    }

    /// Perform one refresh attempt and record its outcome for queued waiters.
    async fn run_refresh(&self, cycle: &mut RefreshCycle) -> Result<Token> {
        let outcome = self.refresh_locked().await;
        cycle.last_failure = outcome.as_ref().err().map(shared_failure);
        self.refresh_attempts.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Cached token if it is fresh beyond the safety margin.
    /// Falls back to a disk load when nothing is cached yet.
    fn cached_fresh(&self) -> Option<Token> {
        {
            let cached = self.cached.read();
            if let Some(ref token) = *cached {
                if !token.expires_within(self.safety_margin) {
                    return Some(token.clone());
                }
                return None;
            }
        }

        // Nothing cached yet: a stored record may still be fresh.
        match self.load() {
            Ok(Some(token)) if !token.expires_within(self.safety_margin) => Some(token),
            _ => None,
        }
    }

    /// Perform the refresh exchange. Caller must hold the refresh gate.
    async fn refresh_locked(&self) -> Result<Token> {
        let current = {
            let cached = self.cached.read();
            cached.clone()
        };

        let current = match current {
            Some(token) => token,
            None => self.load()?.ok_or_else(|| {
                Error::Unauthenticated(format!(
                    "No token at {}. Run `schwab-mcp auth <redirect-url>` first.",
                    self.token_path.display()
                ))
            })?,
        };

        debug!("Refreshing access token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header(AUTHORIZATION, self.basic_auth())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_send_error(&e, "token refresh"))?;

        let token = self.read_token_response(response).await?;
        info!(expires_in = ?token.time_until_expiry(), "Access token refreshed");
        Ok(token)
    }

    /// Exchange an authorization code for the initial token pair.
    ///
    /// Used by the `auth` subcommand to seed the token file; every later
    /// credential comes from the refresh exchange.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token> {
        let _gate = self.refresh_gate.lock().await;

        let response = self
            .http_client
            .post(&self.token_url)
            .header(AUTHORIZATION, self.basic_auth())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| classify_send_error(&e, "code exchange"))?;

        let token = self.read_token_response(response).await?;
        info!(path = %self.token_path.display(), "Initial token saved");
        Ok(token)
    }

    /// Validate, decode, persist, and cache a token-endpoint response.
    ///
    /// On any failure the previously cached/persisted token is untouched.
    /// A 2xx body without a rotated refresh token is a decode failure; the
    /// old refresh token is never silently reused.
    async fn read_token_response(&self, response: reqwest::Response) -> Result<Token> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthFailure {
                status: status.as_u16(),
                message: sanitize_body(&body),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::TimeoutFailure("token endpoint body exceeded the deadline".to_string())
            } else {
                Error::DecodeFailure(format!("token endpoint body: {e}"))
            }
        })?;

        let rotated = token_response.refresh_token.clone().ok_or_else(|| {
            Error::DecodeFailure("token endpoint omitted refresh_token".to_string())
        })?;

        let token = Token::from_response(token_response, rotated);
        self.save(&token)?;
        Ok(token)
    }
}

/// Rebuild a refresh failure so one attempt's error can be handed to every
/// queued waiter. Persistence errors collapse to their rendered message.
fn shared_failure(e: &Error) -> Error {
    match e {
        Error::Unauthenticated(m) => Error::Unauthenticated(m.clone()),
        Error::AuthFailure { status, message } => Error::AuthFailure {
            status: *status,
            message: message.clone(),
        },
        Error::DecodeFailure(m) => Error::DecodeFailure(m.clone()),
        Error::TimeoutFailure(m) => Error::TimeoutFailure(m.clone()),
        Error::Transport(m) => Error::Transport(m.clone()),
        other => Error::Transport(other.to_string()),
    }
}

/// Map a reqwest send error to the taxonomy without leaking request details
fn classify_send_error(e: &reqwest::Error, what: &str) -> Error {
    if e.is_timeout() {
        Error::TimeoutFailure(format!("{what} exceeded its deadline"))
    } else {
        Error::Transport(format!("{what} failed: {e}"))
    }
}

/// Truncate an upstream error body for inclusion in messages
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 300 {
        let head: String = trimmed.chars().take(300).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}
