//! Option chain tools

use serde_json::{Value, json};

use super::{ToolRegistry, field, required_symbol};
use crate::Result;
use crate::client::OptionChainParams;

pub(super) fn option_chain_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Underlying stock symbol"
            },
            "contract_type": {
                "type": "string",
                "enum": ["CALL", "PUT", "ALL"],
                "description": "Type of options to retrieve",
                "default": "ALL"
            },
            "strike_count": {
                "type": "integer",
                "description": "Number of strikes above and below ATM (default: all strikes)"
            },
            "from_date": {
                "type": "string",
                "description": "Start date for expirations (YYYY-MM-DD)"
            },
            "to_date": {
                "type": "string",
                "description": "End date for expirations (YYYY-MM-DD)"
            }
        },
        "required": ["symbol"]
    })
}

/// Flatten one contract at a strike. The vendor nests a one-element array
/// of contracts under each strike price key.
fn parse_contract(strike: &str, contracts: &Value) -> Option<Value> {
    let opt = contracts.as_array()?.first()?;

    Some(json!({
        "symbol": field(opt, "symbol"),
        "description": field(opt, "description"),
        "strike": strike.parse::<f64>().ok(),
        "expiration": field(opt, "expirationDate"),
        "days_to_expiration": field(opt, "daysToExpiration"),
        "bid": field(opt, "bid"),
        "ask": field(opt, "ask"),
        "last": field(opt, "last"),
        "mark": field(opt, "mark"),
        "volume": field(opt, "totalVolume"),
        "open_interest": field(opt, "openInterest"),
        "implied_volatility": field(opt, "volatility"),
        "delta": field(opt, "delta"),
        "gamma": field(opt, "gamma"),
        "theta": field(opt, "theta"),
        "vega": field(opt, "vega"),
        "rho": field(opt, "rho"),
        "in_the_money": field(opt, "inTheMoney"),
        "intrinsic_value": field(opt, "intrinsicValue"),
        "extrinsic_value": field(opt, "extrinsicValue"),
        "time_value": field(opt, "timeValue"),
    }))
}

/// Flatten an expiration-date map (`date → strike → [contract]`) into a list
/// sorted by (expiration, strike).
fn parse_option_map(exp_date_map: &Value) -> Vec<Value> {
    let mut contracts = Vec::new();

    if let Some(dates) = exp_date_map.as_object() {
        for strikes in dates.values() {
            if let Some(strikes) = strikes.as_object() {
                for (strike, entry) in strikes {
                    if let Some(parsed) = parse_contract(strike, entry) {
                        contracts.push(parsed);
                    }
                }
            }
        }
    }

    contracts.sort_by(|a, b| {
        let exp_a = a["expiration"].as_str().unwrap_or("");
        let exp_b = b["expiration"].as_str().unwrap_or("");
        let strike_a = a["strike"].as_f64().unwrap_or(0.0);
        let strike_b = b["strike"].as_f64().unwrap_or(0.0);
        exp_a
            .cmp(exp_b)
            .then(strike_a.total_cmp(&strike_b))
    });
    contracts
}

pub(super) async fn get_option_chain(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let symbol = required_symbol(args, "symbol")?;
    let contract_type = args
        .get("contract_type")
        .and_then(Value::as_str)
        .unwrap_or("ALL")
        .to_uppercase();

    let params = OptionChainParams {
        symbol: symbol.clone(),
        contract_type: contract_type.clone(),
        strike_count: args
            .get("strike_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        from_date: args
            .get("from_date")
            .and_then(Value::as_str)
            .map(str::to_string),
        to_date: args
            .get("to_date")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..OptionChainParams::default()
    };

    let response = registry.client().option_chain(&params).await?;

    let underlying = response.get("underlying").cloned().unwrap_or_else(|| json!({}));
    let underlying_price = underlying
        .get("last")
        .and_then(Value::as_f64)
        .or_else(|| underlying.get("mark").and_then(Value::as_f64));

    let calls = if matches!(contract_type.as_str(), "CALL" | "ALL") {
        parse_option_map(response.get("callExpDateMap").unwrap_or(&Value::Null))
    } else {
        Vec::new()
    };
    let puts = if matches!(contract_type.as_str(), "PUT" | "ALL") {
        parse_option_map(response.get("putExpDateMap").unwrap_or(&Value::Null))
    } else {
        Vec::new()
    };

    Ok(json!({
        "symbol": symbol,
        "underlying_price": underlying_price,
        "underlying": {
            "last": field(&underlying, "last"),
            "bid": field(&underlying, "bid"),
            "ask": field(&underlying, "ask"),
            "change": field(&underlying, "change"),
            "percent_change": field(&underlying, "percentChange"),
            "volume": field(&underlying, "totalVolume"),
        },
        "status": field(&response, "status"),
        "is_delayed": field(&response, "isDelayed"),
        "number_of_contracts": field(&response, "numberOfContracts"),
        "calls": calls,
        "puts": puts,
    }))
}
