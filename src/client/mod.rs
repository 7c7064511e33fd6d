//! Authenticated Schwab API client
//!
//! Every outbound call goes through [`SchwabClient::get`]: bearer credential
//! from the token store, bounded timeout, and uniform failure classification.
//! The public surface issues GET requests only; no mutating verb exists, so
//! the read-only guarantee holds structurally rather than by convention.
//!
//! # Security
//!
//! Access tokens are injected at request time and never logged or included
//! in error messages.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::auth::TokenStore;
use crate::{Error, Result};

/// Query parameters: string keys with scalar values
pub type Query = Vec<(String, String)>;

/// Read-only HTTP client for the Schwab trader and market data APIs
pub struct SchwabClient {
    http_client: Client,
    tokens: Arc<TokenStore>,
    trader_base: String,
    market_base: String,
}

impl SchwabClient {
    /// Create a new client with a bounded per-call timeout.
    pub fn new(
        tokens: Arc<TokenStore>,
        trader_base: String,
        market_base: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            tokens,
            trader_base,
            market_base,
        })
    }

    /// Perform an authenticated GET and decode the JSON body.
    ///
    /// A 401/403 response forces a single token refresh and one re-issue;
    /// the second rejection is surfaced as [`Error::AuthFailure`]. No other
    /// retry happens here; transient errors go to the caller.
    pub async fn get(&self, url: &str, query: &Query) -> Result<Value> {
        let token = self.tokens.valid_token().await?;

        match self.send_once(url, query, &token.access_token).await {
            Err(Error::AuthFailure { status, .. }) => {
                debug!(status, "Bearer token rejected, forcing one refresh");
                let token = self.tokens.refresh().await?;
                self.send_once(url, query, &token.access_token).await
            }
            other => other,
        }
    }

    /// One HTTP exchange with classification, no retries.
    async fn send_once(&self, url: &str, query: &Query, access_token: &str) -> Result<Value> {
        let mut request = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::TimeoutFailure(format!("GET {url} exceeded its deadline"))
            } else {
                Error::Transport(format!("GET {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "GET");

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| Error::DecodeFailure(format!("response body: {e}")));
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                Err(Error::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::AuthFailure {
                    status: status.as_u16(),
                    message: truncate(&body),
                })
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("GET {url}"))),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::UpstreamFailure {
                    status: status.as_u16(),
                    message: truncate(&body),
                })
            }
        }
    }

    // ========================================================================
    // Account endpoints (Trader API)
    // ========================================================================

    /// List account numbers with their hash values
    pub async fn account_numbers(&self) -> Result<Value> {
        let url = format!("{}/accounts/accountNumbers", self.trader_base);
        self.get(&url, &Vec::new()).await
    }

    /// Get one account by hash, optionally including extra fields
    /// (e.g. `positions`)
    pub async fn account(&self, account_hash: &str, fields: &[&str]) -> Result<Value> {
        let url = format!("{}/accounts/{account_hash}", self.trader_base);
        self.get(&url, &fields_query(fields)).await
    }

    /// Get all accounts, optionally including extra fields
    pub async fn accounts(&self, fields: &[&str]) -> Result<Value> {
        let url = format!("{}/accounts", self.trader_base);
        self.get(&url, &fields_query(fields)).await
    }

    // ========================================================================
    // Market data endpoints
    // ========================================================================

    /// Get quotes for one or more symbols (comma-joined batch endpoint)
    pub async fn quotes(&self, symbols: &[String]) -> Result<Value> {
        let url = format!("{}/quotes", self.market_base);
        let joined = symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        self.get(&url, &vec![("symbols".to_string(), joined)]).await
    }

    /// Get the option chain for an underlying symbol
    pub async fn option_chain(&self, params: &OptionChainParams) -> Result<Value> {
        let url = format!("{}/chains", self.market_base);

        let mut query: Query = vec![
            ("symbol".to_string(), params.symbol.to_uppercase()),
            ("contractType".to_string(), params.contract_type.clone()),
            (
                "includeUnderlyingQuote".to_string(),
                params.include_underlying_quote.to_string(),
            ),
            ("strategy".to_string(), params.strategy.clone()),
        ];
        if let Some(count) = params.strike_count {
            query.push(("strikeCount".to_string(), count.to_string()));
        }
        if let Some(ref from) = params.from_date {
            query.push(("fromDate".to_string(), from.clone()));
        }
        if let Some(ref to) = params.to_date {
            query.push(("toDate".to_string(), to.clone()));
        }

        self.get(&url, &query).await
    }

    /// Get OHLCV price history for a symbol
    pub async fn price_history(&self, params: &PriceHistoryParams) -> Result<Value> {
        let url = format!("{}/pricehistory", self.market_base);

        let mut query: Query = vec![
            ("symbol".to_string(), params.symbol.to_uppercase()),
            ("periodType".to_string(), params.period_type.clone()),
            ("period".to_string(), params.period.to_string()),
            ("frequencyType".to_string(), params.frequency_type.clone()),
            ("frequency".to_string(), params.frequency.to_string()),
            (
                "needExtendedHoursData".to_string(),
                params.need_extended_hours.to_string(),
            ),
            (
                "needPreviousClose".to_string(),
                params.need_previous_close.to_string(),
            ),
        ];
        if let Some(start) = params.start_date {
            query.push(("startDate".to_string(), start.to_string()));
        }
        if let Some(end) = params.end_date {
            query.push(("endDate".to_string(), end.to_string()));
        }

        self.get(&url, &query).await
    }
}

/// Option chain request parameters
#[derive(Debug, Clone)]
pub struct OptionChainParams {
    /// Underlying symbol
    pub symbol: String,
    /// CALL, PUT, or ALL
    pub contract_type: String,
    /// Number of strikes above/below at-the-money
    pub strike_count: Option<u32>,
    /// Include the underlying quote in the response
    pub include_underlying_quote: bool,
    /// Option strategy (SINGLE for plain chains)
    pub strategy: String,
    /// Earliest expiration date (YYYY-MM-DD)
    pub from_date: Option<String>,
    /// Latest expiration date (YYYY-MM-DD)
    pub to_date: Option<String>,
}

impl Default for OptionChainParams {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            contract_type: "ALL".to_string(),
            strike_count: None,
            include_underlying_quote: true,
            strategy: "SINGLE".to_string(),
            from_date: None,
            to_date: None,
        }
    }
}

/// Price history request parameters
#[derive(Debug, Clone)]
pub struct PriceHistoryParams {
    /// Ticker symbol
    pub symbol: String,
    /// day, month, year, or ytd
    pub period_type: String,
    /// Number of periods
    pub period: u32,
    /// minute, daily, weekly, or monthly
    pub frequency_type: String,
    /// Frequency interval
    pub frequency: u32,
    /// Start of the range, epoch milliseconds
    pub start_date: Option<i64>,
    /// End of the range, epoch milliseconds
    pub end_date: Option<i64>,
    /// Include extended-hours candles
    pub need_extended_hours: bool,
    /// Include the previous close
    pub need_previous_close: bool,
}

impl Default for PriceHistoryParams {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            period_type: "year".to_string(),
            period: 1,
            frequency_type: "daily".to_string(),
            frequency: 1,
            start_date: None,
            end_date: None,
            need_extended_hours: false,
            need_previous_close: true,
        }
    }
}

fn fields_query(fields: &[&str]) -> Query {
    if fields.is_empty() {
        Vec::new()
    } else {
        vec![("fields".to_string(), fields.join(","))]
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 300 {
        let head: String = trimmed.chars().take(300).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}
