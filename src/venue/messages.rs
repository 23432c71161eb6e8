//! Deriv WebSocket API messages.
//!
//! Outbound requests are built as JSON values; inbound frames are parsed
//! into `FeedEvent`s by `parse_inbound`, which has no side effects.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::FeedEvent;
use crate::engine::extractor::pip_to_precision;
use crate::types::{Account, ContractRequest, Symbol, Tick, WatchError};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

pub fn authorize(token: &str) -> Value {
    json!({ "authorize": token })
}

pub fn active_symbols() -> Value {
    json!({ "active_symbols": "brief", "product_type": "basic" })
}

pub fn balance_subscribe() -> Value {
    json!({ "balance": 1, "subscribe": 1 })
}

pub fn ticks_subscribe(symbol: &Symbol, req_id: u64) -> Value {
    json!({ "ticks": symbol.as_str(), "subscribe": 1, "req_id": req_id })
}

pub fn ping() -> Value {
    json!({ "ping": 1 })
}

/// Contract parameters shared by `proposal` and `buy`.
fn contract_parameters(request: &ContractRequest) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("amount".into(), json!(request.amount.to_f64().unwrap_or_default()));
    params.insert("basis".into(), json!("stake"));
    params.insert("contract_type".into(), json!(request.contract_type.as_str()));
    params.insert("currency".into(), json!(request.currency));
    params.insert("duration".into(), json!(request.duration));
    params.insert("duration_unit".into(), json!("t"));
    params.insert("symbol".into(), json!(request.symbol.as_str()));
    if let Some(barrier) = &request.barrier {
        params.insert("barrier".into(), json!(barrier));
    }
    params
}

pub fn proposal(request: &ContractRequest) -> Value {
    let mut msg = contract_parameters(request);
    msg.insert("proposal".into(), json!(1));
    Value::Object(msg)
}

pub fn buy(request: &ContractRequest) -> Value {
    json!({
        "buy": 1,
        "price": request.amount.to_f64().unwrap_or_default(),
        "parameters": Value::Object(contract_parameters(request)),
    })
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    msg_type: String,
    error: Option<ApiErrorBody>,
    tick: Option<TickBody>,
    authorize: Option<AuthorizeBody>,
    balance: Option<BalanceBody>,
    active_symbols: Option<Vec<ActiveSymbol>>,
    buy: Option<BuyBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TickBody {
    symbol: String,
    quote: Option<f64>,
    #[serde(default)]
    epoch: i64,
    pip_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeBody {
    loginid: String,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    balance: Decimal,
    #[serde(default)]
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ActiveSymbol {
    symbol: String,
    pip: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BuyBody {
    contract_id: i64,
    buy_price: Decimal,
    #[serde(default)]
    longcode: String,
}

/// Parse one text frame.
///
/// `Ok(None)` for frames that carry nothing the engine uses (pongs,
/// proposals, subscription acknowledgements).
pub fn parse_inbound(text: &str) -> Result<Option<FeedEvent>, WatchError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| WatchError::Feed(format!("unparseable frame: {e}")))?;

    if let Some(error) = envelope.error {
        return Ok(Some(FeedEvent::ApiError {
            msg_type: envelope.msg_type,
            code: error.code,
            message: error.message,
        }));
    }

    if let Some(tick) = envelope.tick {
        let quote = tick.quote.ok_or_else(|| WatchError::MalformedTick {
            symbol: tick.symbol.clone(),
            reason: "missing quote".into(),
        })?;
        return Ok(Some(FeedEvent::Tick {
            tick: Tick {
                symbol: Symbol::new(tick.symbol),
                quote,
                epoch: tick.epoch,
            },
            pip_size: tick.pip_size,
        }));
    }

    if let Some(auth) = envelope.authorize {
        return Ok(Some(FeedEvent::Authorized(Account {
            loginid: auth.loginid,
            currency: auth.currency,
            balance: auth.balance,
        })));
    }

    if let Some(balance) = envelope.balance {
        return Ok(Some(FeedEvent::Balance {
            balance: balance.balance,
            currency: balance.currency,
        }));
    }

    if let Some(symbols) = envelope.active_symbols {
        let precisions = symbols
            .into_iter()
            .filter_map(|s| {
                let precision = pip_to_precision(s.pip?)?;
                Some((Symbol::new(s.symbol), precision))
            })
            .collect();
        return Ok(Some(FeedEvent::Precisions(precisions)));
    }

    if let Some(buy) = envelope.buy {
        return Ok(Some(FeedEvent::ContractBought {
            contract_id: buy.contract_id,
            buy_price: buy.buy_price,
            longcode: buy.longcode,
        }));
    }

    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
