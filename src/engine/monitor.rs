//! Monitor: the per-tick pipeline.
//!
//! Consumes feed messages in order and runs tick → extractor → history →
//! trackers → dispatcher synchronously. Connection changes update the shared
//! session; a fresh connection starts every symbol from an empty window.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::alerts::{Alert, AlertKind, AlertLevel, AlertLog};
use super::dispatcher::{DispatchOutcome, SignalDispatcher};
use super::extractor::PrecisionTable;
use super::registry::{PatternEvent, SymbolRegistry, SymbolSnapshot};
use super::session::SharedSession;
use super::stats::Statistics;
use super::tracker::IsolationPolicy;
use crate::settings::Settings;
use crate::types::{Symbol, Tick, TradeIntent};
use crate::venue::{ConnectionStatus, FeedEvent, FeedMessage};

pub type SharedRegistry = Arc<RwLock<SymbolRegistry>>;

/// Everything the monitor needs from the outside.
pub struct MonitorParts {
    pub symbols: Vec<Symbol>,
    pub history_window: usize,
    pub isolation: IsolationPolicy,
    pub settings: watch::Receiver<Settings>,
    pub session: SharedSession,
    pub alerts: Arc<AlertLog>,
    pub stats: Arc<Statistics>,
    pub intents: mpsc::UnboundedSender<TradeIntent>,
}

pub struct Monitor {
    registry: SharedRegistry,
    precisions: PrecisionTable,
    isolation: IsolationPolicy,
    dispatcher: SignalDispatcher,
    settings: watch::Receiver<Settings>,
    session: SharedSession,
    alerts: Arc<AlertLog>,
    stats: Arc<Statistics>,
}

impl Monitor {
    pub fn new(parts: MonitorParts) -> Self {
        let registry = SymbolRegistry::with_symbols(parts.history_window, parts.symbols);
        Self {
            registry: Arc::new(RwLock::new(registry)),
            precisions: PrecisionTable::new(),
            isolation: parts.isolation,
            dispatcher: SignalDispatcher::new(parts.alerts.clone(), parts.intents),
            settings: parts.settings,
            session: parts.session,
            alerts: parts.alerts,
            stats: parts.stats,
        }
    }

    /// Handle to the registry for read-only views.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn precisions_mut(&mut self) -> &mut PrecisionTable {
        &mut self.precisions
    }

    pub fn snapshot(&self) -> Vec<SymbolSnapshot> {
        let min = self.settings.borrow().min_cluster_size();
        self.registry.read().snapshot(min)
    }

    /// Process feed messages until the channel closes.
    pub async fn run(mut self, mut feed: mpsc::Receiver<FeedMessage>) {
        while let Some(message) = feed.recv().await {
            self.handle(message);
        }
        info!("Feed channel closed, monitor stopping");
    }

    pub fn handle(&mut self, message: FeedMessage) -> Vec<PatternEvent> {
        match message {
            FeedMessage::Status(status) => {
                self.on_status(status);
                Vec::new()
            }
            FeedMessage::Event(event) => self.on_event(event),
        }
    }

    fn on_status(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => {
                self.registry.write().reset_all();
                self.session.write().connected = true;
                self.alerts.push(Alert::new(
                    AlertKind::System,
                    AlertLevel::Success,
                    "Connected to Deriv WebSocket",
                ));
            }
            ConnectionStatus::Disconnected => {
                let was_connected = {
                    let mut session = self.session.write();
                    let was = session.connected;
                    session.connected = false;
                    session.account = None;
                    was
                };
                if was_connected {
                    self.alerts.push(Alert::new(
                        AlertKind::System,
                        AlertLevel::Warning,
                        "WebSocket connection closed",
                    ));
                }
            }
            ConnectionStatus::Reconnecting => debug!("Feed reconnecting"),
        }
    }

    pub fn on_event(&mut self, event: FeedEvent) -> Vec<PatternEvent> {
        match event {
            FeedEvent::Tick { tick, pip_size } => {
                if let Some(precision) = pip_size {
                    self.precisions.set_if_absent(tick.symbol.clone(), precision);
                }
                return self.on_tick(&tick);
            }
            FeedEvent::Precisions(precisions) => {
                let count = precisions.len();
                for (symbol, precision) in precisions {
                    self.precisions.set(symbol, precision);
                }
                debug!(count, "Symbol precisions updated");
            }
            FeedEvent::Authorized(account) => {
                self.alerts.push(Alert::new(
                    AlertKind::System,
                    AlertLevel::Success,
                    format!("Successfully authorized as {account}"),
                ));
                self.session.write().account = Some(account);
            }
            FeedEvent::Balance { balance, currency } => {
                if let Some(account) = self.session.write().account.as_mut() {
                    account.balance = balance;
                    if !currency.is_empty() {
                        account.currency = currency;
                    }
                }
            }
            FeedEvent::ContractBought {
                contract_id,
                buy_price,
                longcode,
            } => {
                self.alerts.push(Alert::new(
                    AlertKind::Trade,
                    AlertLevel::Success,
                    format!("Contract {contract_id} bought for {buy_price:.2}: {longcode}"),
                ));
            }
            FeedEvent::ApiError {
                msg_type,
                code,
                message,
            } => {
                let text = if msg_type == "authorize" {
                    format!("Authorization error: {message}")
                } else {
                    format!("API Error ({code}): {message}")
                };
                self.alerts
                    .push(Alert::new(AlertKind::System, AlertLevel::Error, text));
            }
        }
        Vec::new()
    }

    /// The per-tick path.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<PatternEvent> {
        let digit = match self.precisions.extract(tick) {
            Ok(d) => d,
            Err(e) => {
                warn!(symbol = %tick.symbol, error = %e, "Dropping tick");
                self.stats.record_dropped_tick();
                return Vec::new();
            }
        };

        let settings = self.settings.borrow().clone();
        let params = settings.tracker_params(self.isolation);

        let events = {
            let mut registry = self.registry.write();
            match registry.process(&tick.symbol, tick.quote, digit, &params) {
                Some(events) => events,
                None => {
                    debug!(symbol = %tick.symbol, "Tick for unsubscribed symbol");
                    return Vec::new();
                }
            }
        };
        self.stats.record_tick();
        debug!(symbol = %tick.symbol, quote = tick.quote, digit = %digit, "Tick");

        for event in &events {
            match event {
                PatternEvent::ClusterFormed {
                    symbol,
                    digit,
                    count,
                    readopted,
                } => {
                    if !*readopted && *count == settings.alert_threshold() {
                        self.alerts.push(
                            Alert::new(
                                AlertKind::Pattern,
                                AlertLevel::Warning,
                                format!(
                                    "Digit {digit} reached {count} clusters on {}",
                                    symbol.label()
                                ),
                            )
                            .about(symbol, *digit, *count),
                        );
                    }
                }
                PatternEvent::SequenceEnded {
                    symbol,
                    digit,
                    count,
                } => {
                    debug!(
                        symbol = %symbol,
                        digit = %digit,
                        clusters = count,
                        "Cluster sequence ended"
                    );
                    self.stats.record_sequence_end(*count);
                }
                PatternEvent::Triggered(trigger) => {
                    self.stats.record_trigger();
                    let session = self.session.read().clone();
                    if let DispatchOutcome::Refused(reason) =
                        self.dispatcher.dispatch(trigger, &settings, &session)
                    {
                        debug!(symbol = %trigger.symbol, reason = %reason, "Trigger not traded");
                    }
                }
            }
        }
        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
