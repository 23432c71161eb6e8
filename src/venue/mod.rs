//! Trading venue integration.
//!
//! Defines the `OrderGateway` seam the executor sends orders through, the
//! `FeedEvent`s the engine consumes, and a Deriv-compatible WebSocket
//! client that produces the one and implements the other.

pub mod client;
pub mod messages;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Account, ContractRequest, Symbol, Tick};

pub use client::{ConnectionStatus, DerivClient, FeedConfig, FeedHandle, FeedMessage};

/// Outbound order path to the venue.
///
/// Both calls return once the request is on the wire; the venue's answer
/// arrives later as a `FeedEvent`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Request a price quote for the contract.
    async fn propose(&self, request: &ContractRequest) -> Result<()>;

    /// Buy the contract at the requested stake.
    async fn buy(&self, request: &ContractRequest) -> Result<()>;
}

/// Inbound message from the venue, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A price update. `pip_size` is the decimal precision the venue
    /// reported alongside it, if any.
    Tick { tick: Tick, pip_size: Option<u32> },
    Authorized(Account),
    Balance { balance: Decimal, currency: String },
    /// Decimal precision per symbol, from symbol metadata.
    Precisions(Vec<(Symbol, u32)>),
    ContractBought {
        contract_id: i64,
        buy_price: Decimal,
        longcode: String,
    },
    ApiError {
        msg_type: String,
        code: String,
        message: String,
    },
}
