//! Price history tools

use chrono::{DateTime, NaiveDate};
use serde_json::{Value, json};

use super::{ToolRegistry, field, required_symbol};
use crate::client::PriceHistoryParams;
use crate::{Error, Result};

pub(super) fn price_history_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Stock ticker symbol"
            },
            "period_type": {
                "type": "string",
                "enum": ["day", "month", "year", "ytd"],
                "description": "Type of period (default: year)",
                "default": "year"
            },
            "period": {
                "type": "integer",
                "description": "Number of periods (default: 1)",
                "default": 1
            },
            "frequency_type": {
                "type": "string",
                "enum": ["minute", "daily", "weekly", "monthly"],
                "description": "Frequency of data points (default: daily)",
                "default": "daily"
            },
            "frequency": {
                "type": "integer",
                "description": "Frequency interval (default: 1)",
                "default": 1
            },
            "start_date": {
                "type": "string",
                "description": "Start date (YYYY-MM-DD), alternative to period"
            },
            "end_date": {
                "type": "string",
                "description": "End date (YYYY-MM-DD)"
            },
            "extended_hours": {
                "type": "boolean",
                "description": "Include extended hours data (default: false)",
                "default": false
            }
        },
        "required": ["symbol"]
    })
}

/// `YYYY-MM-DD` → epoch milliseconds at midnight UTC
fn date_to_epoch_ms(date: &str) -> Result<i64> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| Error::Protocol(format!("Invalid date '{date}': expected YYYY-MM-DD")))?;
    Ok(parsed
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
        .timestamp_millis())
}

/// Epoch milliseconds → ISO-8601 (UTC, second precision)
fn epoch_ms_to_iso(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn parse_candle(candle: &Value) -> Value {
    let datetime = candle
        .get("datetime")
        .and_then(Value::as_i64)
        .map(epoch_ms_to_iso)
        .unwrap_or_default();

    json!({
        "datetime": datetime,
        "open": field(candle, "open"),
        "high": field(candle, "high"),
        "low": field(candle, "low"),
        "close": field(candle, "close"),
        "volume": field(candle, "volume"),
    })
}

pub(super) async fn get_price_history(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let symbol = required_symbol(args, "symbol")?;

    let mut params = PriceHistoryParams {
        symbol: symbol.clone(),
        ..PriceHistoryParams::default()
    };
    if let Some(period_type) = args.get("period_type").and_then(Value::as_str) {
        params.period_type = period_type.to_string();
    }
    if let Some(period) = args.get("period").and_then(Value::as_u64) {
        params.period = u32::try_from(period).unwrap_or(1);
    }
    if let Some(frequency_type) = args.get("frequency_type").and_then(Value::as_str) {
        params.frequency_type = frequency_type.to_string();
    }
    if let Some(frequency) = args.get("frequency").and_then(Value::as_u64) {
        params.frequency = u32::try_from(frequency).unwrap_or(1);
    }
    if let Some(start) = args.get("start_date").and_then(Value::as_str) {
        params.start_date = Some(date_to_epoch_ms(start)?);
    }
    if let Some(end) = args.get("end_date").and_then(Value::as_str) {
        params.end_date = Some(date_to_epoch_ms(end)?);
    }
    params.need_extended_hours = args
        .get("extended_hours")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let response = registry.client().price_history(&params).await?;

    let mut candles: Vec<Value> = response
        .get("candles")
        .and_then(Value::as_array)
        .map(|raw| raw.iter().map(parse_candle).collect())
        .unwrap_or_default();

    // Oldest first
    candles.sort_by(|a, b| {
        a["datetime"]
            .as_str()
            .unwrap_or("")
            .cmp(b["datetime"].as_str().unwrap_or(""))
    });

    Ok(json!({
        "symbol": symbol,
        "period_type": params.period_type,
        "period": params.period,
        "frequency_type": params.frequency_type,
        "frequency": params.frequency,
        "previous_close": field(&response, "previousClose"),
        "previous_close_date": field(&response, "previousCloseDate"),
        "candle_count": candles.len(),
        "candles": candles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn date_round_trips_through_epoch_ms() {
        let ms = date_to_epoch_ms("2025-06-15").unwrap();
        assert_eq!(epoch_ms_to_iso(ms), "2025-06-15T00:00:00");
    }

    #[test]
    fn invalid_date_is_rejected() {
        assert!(date_to_epoch_ms("06/15/2025").is_err());
        assert!(date_to_epoch_ms("2025-13-40").is_err());
    }

    #[test]
    fn candle_datetime_becomes_iso() {
        let candle = json!({
            "datetime": 1_750_000_000_000_i64,
            "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 100
        });
        let parsed = parse_candle(&candle);
        assert_eq!(parsed["close"], json!(1.5));
        assert!(
            parsed["datetime"]
                .as_str()
                .unwrap()
                .starts_with("2025-06-15T")
        );
    }
}
