//! Quote tools

use serde_json::{Value, json};

use super::{ToolRegistry, field, required_symbol};
use crate::{Error, Result};

pub(super) fn quote_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Stock ticker symbol (e.g., 'AAPL', 'CRM')"
            }
        },
        "required": ["symbol"]
    })
}

pub(super) fn quotes_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbols": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of ticker symbols"
            }
        },
        "required": ["symbols"]
    })
}

/// Flatten one symbol's vendor quote into the tool's output shape.
///
/// Vendor shape: `{assetMainType, quote: {...}, reference: {...}}`.
fn parse_quote(symbol: &str, data: &Value) -> Value {
    let quote = data.get("quote").cloned().unwrap_or_else(|| json!({}));
    let reference = data.get("reference").cloned().unwrap_or_else(|| json!({}));

    json!({
        "symbol": symbol,
        "asset_type": field(data, "assetMainType"),
        "last_price": field(&quote, "lastPrice"),
        "bid": field(&quote, "bidPrice"),
        "ask": field(&quote, "askPrice"),
        "bid_size": field(&quote, "bidSize"),
        "ask_size": field(&quote, "askSize"),
        "volume": field(&quote, "totalVolume"),
        "day_high": field(&quote, "highPrice"),
        "day_low": field(&quote, "lowPrice"),
        "day_open": field(&quote, "openPrice"),
        "prev_close": field(&quote, "closePrice"),
        "day_change": field(&quote, "netChange"),
        "day_change_percent": field(&quote, "netPercentChange"),
        "52_week_high": field(&quote, "52WeekHigh"),
        "52_week_low": field(&quote, "52WeekLow"),
        "pe_ratio": field(&quote, "peRatio"),
        "div_yield": field(&quote, "divYield"),
        "market_cap": field(&reference, "marketCap"),
        "exchange": field(&reference, "exchange"),
        "description": field(&reference, "description"),
    })
}

pub(super) async fn get_quote(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let symbol = required_symbol(args, "symbol")?;
    let response = registry.client().quotes(&[symbol.clone()]).await?;

    // Response structure: {SYMBOL: {assetMainType, quote, reference}}
    let data = response.get(&symbol).unwrap_or(&response);
    Ok(parse_quote(&symbol, data))
}

pub(super) async fn get_quotes(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let symbols: Vec<String> = args
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Protocol("Missing required argument: symbols".to_string()))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_uppercase)
        .collect();

    if symbols.is_empty() {
        return Err(Error::Protocol("symbols must be a non-empty array".to_string()));
    }

    let response = registry.client().quotes(&symbols).await?;

    let quotes: Vec<Value> = symbols
        .iter()
        .map(|symbol| match response.get(symbol) {
            Some(data) => parse_quote(symbol, data),
            None => json!({"symbol": symbol, "error": "Symbol not found"}),
        })
        .collect();

    Ok(json!({ "quotes": quotes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vendor_quote() -> Value {
        json!({
            "assetMainType": "EQUITY",
            "quote": {
                "lastPrice": 232.5,
                "bidPrice": 232.4,
                "askPrice": 232.6,
                "bidSize": 3,
                "askSize": 5,
                "totalVolume": 48_123_456,
                "highPrice": 234.0,
                "lowPrice": 230.1,
                "openPrice": 231.0,
                "closePrice": 229.9,
                "netChange": 2.6,
                "netPercentChange": 1.13,
                "52WeekHigh": 260.1,
                "52WeekLow": 164.1,
                "peRatio": 35.4,
                "divYield": 0.41
            },
            "reference": {
                "marketCap": 3_500_000_000_000_u64,
                "exchange": "NASDAQ",
                "description": "Apple Inc"
            }
        })
    }

    #[test]
    fn quote_fields_are_remapped() {
        let parsed = parse_quote("AAPL", &vendor_quote());
        assert_eq!(parsed["symbol"], json!("AAPL"));
        assert_eq!(parsed["last_price"], json!(232.5));
        assert_eq!(parsed["prev_close"], json!(229.9));
        assert_eq!(parsed["52_week_high"], json!(260.1));
        assert_eq!(parsed["exchange"], json!("NASDAQ"));
    }

    #[test]
    fn missing_sections_become_nulls() {
        let parsed = parse_quote("XYZ", &json!({}));
        assert_eq!(parsed["last_price"], Value::Null);
        assert_eq!(parsed["market_cap"], Value::Null);
        assert_eq!(parsed["symbol"], json!("XYZ"));
    }
}
