//! Signal dispatcher.
//!
//! Applies the global gates to a trigger and, if they all pass, hands a
//! `TradeIntent` to the executor channel without waiting on it. Every
//! trigger produces an alert whether or not it is dispatched.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::alerts::{Alert, AlertKind, AlertLevel, AlertLog};
use super::registry::TriggerEvent;
use super::session::Session;
use crate::settings::Settings;
use crate::types::TradeIntent;

/// Why a trigger was not turned into a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRefusal {
    AutoTradeDisabled,
    BelowMinimum { count: u32, min: u32 },
    Disconnected,
    NoAccount,
    ExecutorStopped,
}

impl fmt::Display for GateRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRefusal::AutoTradeDisabled => write!(f, "auto-trade disabled"),
            GateRefusal::BelowMinimum { count, min } => {
                write!(f, "{count} clusters is below the minimum of {min}")
            }
            GateRefusal::Disconnected => write!(f, "feed not connected"),
            GateRefusal::NoAccount => write!(f, "no authorized account"),
            GateRefusal::ExecutorStopped => write!(f, "executor not running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dispatched(TradeIntent),
    Refused(GateRefusal),
}

pub struct SignalDispatcher {
    alerts: Arc<AlertLog>,
    intents: mpsc::UnboundedSender<TradeIntent>,
}

impl SignalDispatcher {
    pub fn new(alerts: Arc<AlertLog>, intents: mpsc::UnboundedSender<TradeIntent>) -> Self {
        Self { alerts, intents }
    }

    /// First failing gate, if any. Paper mode never touches the venue, so
    /// it does not need an authorized account.
    fn check_gates(
        trigger: &TriggerEvent,
        settings: &Settings,
        session: &Session,
    ) -> Option<GateRefusal> {
        if !settings.auto_trade_enabled() {
            return Some(GateRefusal::AutoTradeDisabled);
        }
        let min = settings.min_cluster_size();
        if trigger.cluster_count < min {
            return Some(GateRefusal::BelowMinimum {
                count: trigger.cluster_count,
                min,
            });
        }
        if !session.connected {
            return Some(GateRefusal::Disconnected);
        }
        if !settings.paper_trading() && session.account.is_none() {
            return Some(GateRefusal::NoAccount);
        }
        None
    }

    pub fn dispatch(
        &self,
        trigger: &TriggerEvent,
        settings: &Settings,
        session: &Session,
    ) -> DispatchOutcome {
        let label = trigger.symbol.label();

        if let Some(refusal) = Self::check_gates(trigger, settings, session) {
            self.alerts.push(
                Alert::new(
                    AlertKind::Signal,
                    AlertLevel::Info,
                    format!(
                        "Single {} on {label} after {} clusters ({refusal})",
                        trigger.digit, trigger.cluster_count
                    ),
                )
                .about(&trigger.symbol, trigger.digit, trigger.cluster_count),
            );
            return DispatchOutcome::Refused(refusal);
        }

        let intent = TradeIntent {
            symbol: trigger.symbol.clone(),
            target_digit: trigger.digit,
            cluster_count: trigger.cluster_count,
            timestamp: trigger.timestamp,
        };

        if self.intents.send(intent.clone()).is_err() {
            warn!(symbol = %trigger.symbol, "Trade intent dropped, executor channel closed");
            self.alerts.push(
                Alert::new(
                    AlertKind::Signal,
                    AlertLevel::Error,
                    format!(
                        "Signal on {label} digit {} dropped: executor not running",
                        trigger.digit
                    ),
                )
                .about(&trigger.symbol, trigger.digit, trigger.cluster_count),
            );
            return DispatchOutcome::Refused(GateRefusal::ExecutorStopped);
        }

        info!(
            symbol = %trigger.symbol,
            digit = %trigger.digit,
            clusters = trigger.cluster_count,
            paper = settings.paper_trading(),
            "Trade intent dispatched"
        );
        self.alerts.push(
            Alert::new(
                AlertKind::Signal,
                AlertLevel::Success,
                format!(
                    "Differs signal: single {} on {label} after {} clusters",
                    trigger.digit, trigger.cluster_count
                ),
            )
            .about(&trigger.symbol, trigger.digit, trigger.cluster_count),
        );
        DispatchOutcome::Dispatched(intent)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
