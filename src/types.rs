//! Shared types for DIGITWATCH.
//!
//! These types form the data model used across all modules: the engine,
//! the venue client, storage and the dashboard all speak in terms of
//! `Symbol`, `Digit`, `Tick`, `TradeIntent` and `TradeRecord`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// Identifier of one tradable instrument (e.g. `R_25`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-friendly label used in alert messages (`R_25` → `R 25`).
    pub fn label(&self) -> String {
        self.0.replacen('_', " ", 1)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Digit
// ---------------------------------------------------------------------------

/// A single decimal digit, 0–9. Out-of-range values are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    /// All ten digits in ascending order.
    pub const ALL: [Digit; 10] = [
        Digit(0),
        Digit(1),
        Digit(2),
        Digit(3),
        Digit(4),
        Digit(5),
        Digit(6),
        Digit(7),
        Digit(8),
        Digit(9),
    ];

    pub fn new(value: u8) -> Result<Self, WatchError> {
        if value <= 9 {
            Ok(Self(value))
        } else {
            Err(WatchError::InvalidDigit(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Position of this digit in per-digit arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for Digit {
    type Error = WatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Digit::new(value)
    }
}

impl From<Digit> for u8 {
    fn from(d: Digit) -> Self {
        d.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One price update from the feed. `epoch` is carried for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub quote: f64,
    pub epoch: i64,
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} @ {}", self.symbol, self.quote, self.epoch)
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Digit contract types offered by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContractType {
    #[default]
    #[serde(rename = "DIGITDIFF")]
    DigitDiffers,
    #[serde(rename = "DIGITOVER")]
    DigitOver,
    #[serde(rename = "DIGITUNDER")]
    DigitUnder,
    #[serde(rename = "DIGITEVEN")]
    DigitEven,
    #[serde(rename = "DIGITODD")]
    DigitOdd,
}

impl ContractType {
    /// Wire name used by the venue.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::DigitDiffers => "DIGITDIFF",
            ContractType::DigitOver => "DIGITOVER",
            ContractType::DigitUnder => "DIGITUNDER",
            ContractType::DigitEven => "DIGITEVEN",
            ContractType::DigitOdd => "DIGITODD",
        }
    }

    /// Whether the contract is priced against a barrier digit.
    pub fn uses_barrier(&self) -> bool {
        matches!(
            self,
            ContractType::DigitDiffers | ContractType::DigitOver | ContractType::DigitUnder
        )
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade decision produced by the dispatcher. Not retained after execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeIntent {
    pub symbol: Symbol,
    pub target_digit: Digit,
    pub cluster_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} digit {} after {} clusters",
            self.symbol, self.target_digit, self.cluster_count
        )
    }
}

/// Fully parameterised contract order, ready for the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRequest {
    pub symbol: Symbol,
    pub contract_type: ContractType,
    pub amount: Decimal,
    /// Contract length in ticks.
    pub duration: u32,
    pub currency: String,
    /// Barrier digit as a string, `None` for even/odd contracts.
    pub barrier: Option<String>,
}

impl fmt::Display for ContractRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} x{}t",
            self.contract_type, self.symbol, self.amount, self.currency, self.duration
        )?;
        if let Some(b) = &self.barrier {
            write!(f, " barrier={b}")?;
        }
        Ok(())
    }
}

/// Append-only trade history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub symbol: String,
    pub contract_type: String,
    pub amount: Decimal,
    pub duration: u32,
    pub target_digit: u8,
    pub paper: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// Build the record for an order about to be placed (or simulated).
    pub fn from_request(request: &ContractRequest, target_digit: Digit, paper: bool) -> Self {
        Self {
            id: None,
            symbol: request.symbol.to_string(),
            contract_type: request.contract_type.to_string(),
            amount: request.amount,
            duration: request.duration,
            target_digit: target_digit.value(),
            paper,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// The trading account the session is authorized for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub loginid: String,
    pub currency: String,
    pub balance: Decimal,
}

impl Account {
    /// Virtual (demo) accounts are prefixed `VRT`.
    pub fn is_demo(&self) -> bool {
        self.loginid.starts_with("VRT")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {:.2}{})",
            self.loginid,
            self.currency,
            self.balance,
            if self.is_demo() { ", demo" } else { "" }
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for DIGITWATCH.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Malformed tick for {symbol}: {reason}")]
    MalformedTick { symbol: String, reason: String },

    #[error("Unknown pip precision for {0}")]
    UnknownPrecision(String),

    #[error("Invalid digit: {0}")]
    InvalidDigit(u8),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Order rejected ({symbol}): {message}")]
    Order { symbol: String, message: String },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
