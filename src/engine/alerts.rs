//! Alert log.
//!
//! Bounded, newest-first record of what the engine noticed: triggers,
//! trades, pattern thresholds and connection changes. Every alert is also
//! emitted as a tracing event at a level matching its severity.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{error, info, warn};

use crate::types::{Digit, Symbol};

/// Default number of alerts kept.
pub const DEFAULT_ALERT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Signal,
    Trade,
    Pattern,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Success,
    Error,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::Signal => "signal",
            AlertKind::Trade => "trade",
            AlertKind::Pattern => "pattern",
            AlertKind::System => "system",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit: Option<Digit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub message: String,
}

/// An alert before it is stamped with an id and time.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub symbol: Option<Symbol>,
    pub digit: Option<Digit>,
    pub cluster_count: Option<u32>,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            kind,
            level,
            symbol: None,
            digit: None,
            cluster_count: None,
            message: message.into(),
        }
    }

    /// Attach the pattern context the alert is about.
    pub fn about(mut self, symbol: &Symbol, digit: Digit, cluster_count: u32) -> Self {
        self.symbol = Some(symbol.clone());
        self.digit = Some(digit);
        self.cluster_count = Some(cluster_count);
        self
    }
}

struct Inner {
    next_id: u64,
    entries: VecDeque<AlertRecord>,
}

/// Thread-safe bounded alert log.
pub struct AlertLog {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                next_id: 1,
                entries: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an alert, dropping the oldest when full. Returns the stored
    /// record.
    pub fn push(&self, alert: Alert) -> AlertRecord {
        let symbol = alert
            .symbol
            .as_ref()
            .map(Symbol::as_str)
            .unwrap_or("-");
        match alert.level {
            AlertLevel::Error => error!(kind = %alert.kind, symbol, "{}", alert.message),
            AlertLevel::Warning => warn!(kind = %alert.kind, symbol, "{}", alert.message),
            AlertLevel::Info | AlertLevel::Success => {
                info!(kind = %alert.kind, symbol, "{}", alert.message)
            }
        }

        let mut inner = self.inner.lock();
        let record = AlertRecord {
            id: inner.next_id,
            symbol: alert.symbol,
            digit: alert.digit,
            cluster_count: alert.cluster_count,
            timestamp: Utc::now(),
            kind: alert.kind,
            level: alert.level,
            message: alert.message,
        };
        inner.next_id += 1;
        inner.entries.push_front(record.clone());
        inner.entries.truncate(self.capacity);
        record
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        self.inner
            .lock()
            .entries
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}
