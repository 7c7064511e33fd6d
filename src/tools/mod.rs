//! MCP tool definitions and dispatch
//!
//! Six read-only tools over the trader and market data APIs. Each handler
//! translates vendor JSON into the compact field names the assistant sees.

mod account;
mod history;
mod options;
mod quotes;

use std::sync::Arc;

use serde_json::{Value, json};

use crate::client::SchwabClient;
use crate::protocol::{Tool, ToolAnnotations};
use crate::{Error, Result};

/// Tool registry: name → handler, backed by one shared API client
pub struct ToolRegistry {
    client: Arc<SchwabClient>,
    default_account: Option<String>,
}

impl ToolRegistry {
    /// Create a registry over the given client
    #[must_use]
    pub fn new(client: Arc<SchwabClient>, default_account: Option<String>) -> Self {
        Self {
            client,
            default_account,
        }
    }

    pub(crate) fn client(&self) -> &SchwabClient {
        &self.client
    }

    pub(crate) fn default_account(&self) -> Option<&str> {
        self.default_account.as_deref()
    }

    /// All available tools with their input schemas
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        vec![
            tool(
                "get_positions",
                "Get all positions with cost basis, quantity, market value, and gain/loss for an account",
                account::positions_schema(),
            ),
            tool(
                "get_account",
                "Get account information including type (IRA, taxable, etc.) and balances",
                account::account_schema(),
            ),
            tool(
                "get_quote",
                "Get real-time quote for a stock symbol including price, bid/ask, volume, and fundamentals",
                quotes::quote_schema(),
            ),
            tool(
                "get_quotes",
                "Get real-time quotes for multiple symbols at once",
                quotes::quotes_schema(),
            ),
            tool(
                "get_option_chain",
                "Get options chain with Greeks (delta, gamma, theta, vega) for a symbol",
                options::option_chain_schema(),
            ),
            tool(
                "get_price_history",
                "Get historical OHLCV price data for technical analysis",
                history::price_history_schema(),
            ),
        ]
    }

    /// Invoke a tool by name
    pub async fn call(&self, name: &str, args: &Value) -> Result<Value> {
        match name {
            "get_positions" => account::get_positions(self, args).await,
            "get_account" => account::get_account(self, args).await,
            "get_quote" => quotes::get_quote(self, args).await,
            "get_quotes" => quotes::get_quotes(self, args).await,
            "get_option_chain" => options::get_option_chain(self, args).await,
            "get_price_history" => history::get_price_history(self, args).await,
            _ => Err(Error::Protocol(format!("Unknown tool: {name}"))),
        }
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
        annotations: Some(ToolAnnotations {
            read_only_hint: Some(true),
            open_world_hint: Some(true),
        }),
    }
}

/// Required string argument, uppercased (ticker convention)
pub(crate) fn required_symbol(args: &Value, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .ok_or_else(|| Error::Protocol(format!("Missing required argument: {key}")))
}

/// Copy a field out of vendor JSON, defaulting to null
pub(crate) fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}
