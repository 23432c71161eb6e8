//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::engine::{
    AlertLog, AlertRecord, Session, SharedRegistry, SharedSession, Statistics, StatisticsSnapshot,
    SymbolSnapshot,
};
use crate::settings::Settings;
use crate::storage::{Storage, TradeStore};
use crate::types::{Account, TradeRecord, WatchError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub storage: Storage,
    pub settings: watch::Sender<Settings>,
    pub registry: SharedRegistry,
    pub alerts: Arc<AlertLog>,
    pub stats: Arc<Statistics>,
    pub session: SharedSession,
    pub token: Option<SecretString>,
    pub started: DateTime<Utc>,
}

pub type AppState = Arc<DashboardState>;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub db: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesResponse {
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorResponse {
    pub min_cluster_size: u32,
    pub alert_threshold: u32,
    pub symbols: Vec<SymbolSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionResponse {
    pub connected: bool,
    pub account: Option<Account>,
    pub demo: Option<bool>,
    pub uptime_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

// ---------------------------------------------------------------------------
// Backend API
// ---------------------------------------------------------------------------

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        db: state.storage.health().await,
    })
}

/// GET /api/token
pub async fn get_token(State(state): State<AppState>) -> Response {
    match &state.token {
        Some(token) => Json(json!({ "token": token.expose_secret() })).into_response(),
        None => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API token is not configured",
        ),
    }
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    match state.storage.load_settings().await {
        Ok(settings) => Json(settings),
        Err(e) => {
            warn!(error = %e, "Falling back to default settings");
            Json(Settings::default())
        }
    }
}

/// PUT /api/settings
pub async fn put_settings(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    match state.storage.save_settings(body).await {
        Ok(settings) => {
            state.settings.send_replace(settings);
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => match e.downcast_ref::<WatchError>() {
            Some(WatchError::InvalidSettings(msg)) => {
                error_response(StatusCode::BAD_REQUEST, msg.clone())
            }
            _ => {
                error!(error = %e, "Failed to save settings");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save settings")
            }
        },
    }
}

/// Validate a submitted trade row.
fn parse_trade(body: &Value) -> Result<TradeRecord, String> {
    let text = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| format!("{key} must be a non-empty string"))
    };
    let number = |key: &str| {
        body.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("{key} must be a number"))
    };

    let symbol = text("symbol")?;
    let contract_type = text("contract_type")?;
    let amount = number("amount")?;
    let duration = number("duration")?;
    let target_digit = number("target_digit")?;

    let amount = Decimal::from_f64(amount)
        .filter(|a| *a > Decimal::ZERO)
        .ok_or("amount must be positive")?;
    if duration < 1.0 || duration.fract() != 0.0 || duration > u32::MAX as f64 {
        return Err("duration must be a whole number of ticks".into());
    }
    if !(0.0..=9.0).contains(&target_digit) || target_digit.fract() != 0.0 {
        return Err("target_digit must be 0-9".into());
    }

    let paper = match body.get("paper") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    };
    let timestamp = body
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(TradeRecord {
        id: None,
        symbol,
        contract_type,
        amount,
        duration: duration as u32,
        target_digit: target_digit as u8,
        paper,
        timestamp,
    })
}

/// POST /api/trades
pub async fn post_trade(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let trade = match parse_trade(&body) {
        Ok(t) => t,
        Err(reason) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid trade payload: {reason}"),
            )
        }
    };

    match state.storage.record_trade(&trade).await {
        Ok(id) => {
            info!(id, symbol = %trade.symbol, paper = trade.paper, "Trade stored via API");
            (StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to store trade");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store trade")
        }
    }
}

/// GET /api/trades?limit=
pub async fn get_trades(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    // Unparseable limits fall back to the default.
    let limit = query.limit.and_then(|l| l.trim().parse::<u32>().ok());
    match state.storage.recent_trades(limit).await {
        Ok(trades) => Json(TradesResponse { trades }).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to load trades");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load trades")
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor views
// ---------------------------------------------------------------------------

/// GET /api/monitor
pub async fn get_monitor(State(state): State<AppState>) -> Json<MonitorResponse> {
    let (min_cluster_size, alert_threshold) = {
        let settings = state.settings.borrow();
        (settings.min_cluster_size(), settings.alert_threshold())
    };
    let symbols = state.registry.read().snapshot(min_cluster_size);
    Json(MonitorResponse {
        min_cluster_size,
        alert_threshold,
        symbols,
    })
}

/// GET /api/alerts
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<AlertRecord>> {
    let limit = query
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(state.alerts.capacity());
    Json(state.alerts.recent(limit))
}

/// GET /api/statistics
pub async fn get_statistics(State(state): State<AppState>) -> Json<StatisticsSnapshot> {
    Json(state.stats.snapshot())
}

/// POST /api/statistics/reset
pub async fn reset_statistics(State(state): State<AppState>) -> Json<StatisticsSnapshot> {
    state.stats.reset();
    state.alerts.push(crate::engine::Alert::new(
        crate::engine::AlertKind::System,
        crate::engine::AlertLevel::Info,
        "Statistics reset",
    ));
    Json(state.stats.snapshot())
}

/// GET /api/connection
pub async fn get_connection(State(state): State<AppState>) -> Json<ConnectionResponse> {
    let Session { connected, account } = state.session.read().clone();
    Json(ConnectionResponse {
        connected,
        demo: account.as_ref().map(Account::is_demo),
        account,
        uptime_secs: (Utc::now() - state.started).num_seconds(),
    })
}
