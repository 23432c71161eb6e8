//! Persistence layer.
//!
//! SQLite through `sqlx`: an append-only `trades` table and a key/value
//! `settings` table holding the settings document as JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::settings::Settings;
use crate::types::{TradeRecord, WatchError};

/// Rows returned by `recent_trades` when no limit is given.
pub const DEFAULT_TRADE_LIMIT: u32 = 100;

/// Upper bound on rows returned by `recent_trades`.
pub const MAX_TRADE_LIMIT: u32 = 500;

const SETTINGS_KEY: &str = "app";

/// Where executed and simulated trades go.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn record_trade(&self, trade: &TradeRecord) -> Result<i64>;
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .context(format!("Invalid database path {path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context(format!("Failed to open database {path}"))?;

        let storage = Self { pool };
        storage.initialize().await?;
        info!(path, "Database ready");
        Ok(storage)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                contract_type TEXT NOT NULL,
                amount REAL NOT NULL,
                duration INTEGER NOT NULL,
                target_digit INTEGER NOT NULL,
                paper INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create settings table")?;

        Ok(())
    }

    /// Cheap round trip used by the health endpoint.
    pub async fn health(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    // -- Trades --------------------------------------------------------------

    /// Most recent trades, newest first. `limit` defaults to 100 and is
    /// clamped to 1..=500.
    pub async fn recent_trades(&self, limit: Option<u32>) -> Result<Vec<TradeRecord>> {
        let limit = limit
            .unwrap_or(DEFAULT_TRADE_LIMIT)
            .clamp(1, MAX_TRADE_LIMIT);

        let rows = sqlx::query(
            "SELECT id, symbol, contract_type, amount, duration, target_digit, paper, timestamp
             FROM trades ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load trades")?;

        rows.iter()
            .map(|row| -> Result<TradeRecord> {
                let millis: i64 = row.get("timestamp");
                let amount: f64 = row.get("amount");
                let duration: i64 = row.get("duration");
                let target_digit: i64 = row.get("target_digit");
                Ok(TradeRecord {
                    id: Some(row.get("id")),
                    symbol: row.get("symbol"),
                    contract_type: row.get("contract_type"),
                    amount: Decimal::from_f64(amount).unwrap_or_default(),
                    duration: u32::try_from(duration).unwrap_or_default(),
                    target_digit: u8::try_from(target_digit).unwrap_or_default(),
                    paper: row.get::<i64, _>("paper") != 0,
                    timestamp: DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                        WatchError::Storage(format!("bad trade timestamp {millis}"))
                    })?,
                })
            })
            .collect()
    }

    // -- Settings ------------------------------------------------------------

    /// Stored settings merged over the defaults. Defaults when nothing is
    /// stored yet.
    pub async fn load_settings(&self) -> Result<Settings> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load settings")?;

        let Some(row) = row else {
            debug!("No stored settings, using defaults");
            return Ok(Settings::default());
        };

        let raw: String = row.get("value");
        let value: serde_json::Value =
            serde_json::from_str(&raw).context("Stored settings are not valid JSON")?;
        Ok(Settings::merged(value)?)
    }

    /// Merge `update` over the defaults, validate, and store the result.
    pub async fn save_settings(&self, update: serde_json::Value) -> Result<Settings> {
        let settings = Settings::merged(update)?;
        settings.validate()?;

        let json = serde_json::to_string(&settings).context("Failed to serialise settings")?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(SETTINGS_KEY)
        .bind(json)
        .execute(&self.pool)
        .await
        .context("Failed to save settings")?;

        info!(
            auto_trade = settings.auto_trade_enabled(),
            paper = settings.paper_trading(),
            min_clusters = settings.min_cluster_size(),
            "Settings saved"
        );
        Ok(settings)
    }
}

#[async_trait]
impl TradeStore for Storage {
    async fn record_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO trades
                (symbol, contract_type, amount, duration, target_digit, paper, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trade.symbol)
        .bind(&trade.contract_type)
        .bind(trade.amount.to_f64().unwrap_or_default())
        .bind(trade.duration as i64)
        .bind(trade.target_digit as i64)
        .bind(trade.paper)
        .bind(trade.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .context(format!("Failed to record trade for {}", trade.symbol))?;

        let id = result.last_insert_rowid();
        debug!(id, symbol = %trade.symbol, paper = trade.paper, "Trade recorded");
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
