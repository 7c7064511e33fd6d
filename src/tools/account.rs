//! Account tools: positions and balances

use serde_json::{Map, Value, json};

use super::{ToolRegistry, field};
use crate::{Error, Result};

pub(super) fn positions_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": {
                "type": "string",
                "description": "Account hash (optional, uses first account if not provided)"
            }
        },
        "required": []
    })
}

pub(super) fn account_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": {
                "type": "string",
                "description": "Account hash (optional, uses first account if not provided)"
            }
        },
        "required": []
    })
}

/// Resolve the account hash: explicit argument, configured default, or the
/// first account returned by the API.
async fn account_hash(registry: &ToolRegistry, args: &Value) -> Result<String> {
    if let Some(id) = args.get("account_id").and_then(Value::as_str) {
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    if let Some(default) = registry.default_account() {
        return Ok(default.to_string());
    }

    let accounts = registry.client().account_numbers().await?;
    accounts
        .as_array()
        .and_then(|list| list.first())
        .and_then(|entry| entry.get("hashValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::NotFound("No accounts found".to_string()))
}

pub(super) async fn get_positions(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let hash = account_hash(registry, args).await?;

    let response = registry.client().account(&hash, &["positions"]).await?;
    let account_data = response.get("securitiesAccount").unwrap_or(&response);

    let mut positions = Vec::new();
    if let Some(raw) = account_data.get("positions").and_then(Value::as_array) {
        for pos in raw {
            positions.push(parse_position(pos));
        }
    }

    Ok(json!({
        "account_id": hash,
        "positions": positions,
    }))
}

fn parse_position(pos: &Value) -> Value {
    let instrument = pos.get("instrument").cloned().unwrap_or_else(|| json!({}));

    let long_qty = pos.get("longQuantity").and_then(Value::as_f64).unwrap_or(0.0);
    let short_qty = pos.get("shortQuantity").and_then(Value::as_f64).unwrap_or(0.0);
    let quantity = long_qty - short_qty;

    let market_value = pos.get("marketValue").and_then(Value::as_f64).unwrap_or(0.0);
    let cost_per_share = pos.get("averageCostBasis").and_then(Value::as_f64);
    let cost_basis = cost_per_share.map(|avg| avg * quantity.abs());

    let mut position = Map::new();
    position.insert("symbol".to_string(), field(&instrument, "symbol"));
    position.insert("description".to_string(), field(&instrument, "description"));
    position.insert("asset_type".to_string(), field(&instrument, "assetType"));
    position.insert("quantity".to_string(), json!(quantity));
    position.insert("market_value".to_string(), json!(market_value));
    position.insert("average_price".to_string(), field(pos, "averagePrice"));
    position.insert("cost_per_share".to_string(), json!(cost_per_share));
    position.insert("cost_basis".to_string(), json!(cost_basis));
    position.insert("day_change".to_string(), field(pos, "currentDayProfitLoss"));
    position.insert(
        "day_change_percent".to_string(),
        field(pos, "currentDayProfitLossPercentage"),
    );

    // Gain/loss only when a cost basis exists and the position has value
    if let Some(cost_basis) = cost_basis {
        if market_value != 0.0 {
            position.insert("gain_loss".to_string(), json!(market_value - cost_basis));
            let pct = if cost_basis == 0.0 {
                0.0
            } else {
                (market_value - cost_basis) / cost_basis * 100.0
            };
            position.insert("gain_loss_percent".to_string(), json!(pct));
        }
    }

    Value::Object(position)
}

/// Account types whose gains are taxable
const TAXABLE_TYPES: [&str; 4] = ["INDIVIDUAL", "JOINT", "TRUST", "CORPORATE"];

pub(super) async fn get_account(registry: &ToolRegistry, args: &Value) -> Result<Value> {
    let hash = account_hash(registry, args).await?;

    let response = registry.client().account(&hash, &[]).await?;
    let account_data = response.get("securitiesAccount").unwrap_or(&response);

    let account_type = account_data
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");

    // currentBalances, falling back to initialBalances
    let balances = match account_data.get("currentBalances") {
        Some(b) if b.as_object().is_some_and(|m| !m.is_empty()) => b.clone(),
        _ => account_data
            .get("initialBalances")
            .cloned()
            .unwrap_or_else(|| json!({})),
    };

    Ok(json!({
        "account_id": hash,
        "account_type": account_type,
        "is_taxable": TAXABLE_TYPES.contains(&account_type),
        "balances": {
            "cash_available": field(&balances, "availableFunds"),
            "cash_balance": field(&balances, "cashBalance"),
            "market_value": field(&balances, "longMarketValue"),
            "total_value": field(&balances, "liquidationValue"),
            "buying_power": field(&balances, "buyingPower"),
        },
    }))
}
