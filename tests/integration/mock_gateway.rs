//! In-memory stand-ins for the venue and the trade store.
//!
//! The gateway records every order it is handed instead of putting it on
//! the wire; the store keeps rows in a vector.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use digitwatch::storage::TradeStore;
use digitwatch::types::{ContractRequest, TradeRecord};
use digitwatch::venue::OrderGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCall {
    Propose,
    Buy,
}

/// Records proposals and buys in call order.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<(OrderCall, ContractRequest)>>,
    /// If set, every call fails with this message.
    force_error: Mutex<Option<String>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock() = Some(msg.to_string());
    }

    pub fn calls(&self) -> Vec<(OrderCall, ContractRequest)> {
        self.calls.lock().clone()
    }

    fn record(&self, call: OrderCall, request: &ContractRequest) -> Result<()> {
        if let Some(msg) = self.force_error.lock().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        self.calls.lock().push((call, request.clone()));
        Ok(())
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn propose(&self, request: &ContractRequest) -> Result<()> {
        self.record(OrderCall::Propose, request)
    }

    async fn buy(&self, request: &ContractRequest) -> Result<()> {
        self.record(OrderCall::Buy, request)
    }
}

/// Trade rows kept in memory, ids assigned from 1.
#[derive(Default)]
pub struct MemoryStore {
    trades: Mutex<Vec<TradeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().clone()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn record_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let mut trades = self.trades.lock();
        let id = trades.len() as i64 + 1;
        let mut row = trade.clone();
        row.id = Some(id);
        trades.push(row);
        Ok(id)
    }
}
