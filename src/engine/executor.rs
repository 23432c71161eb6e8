//! Trade executor.
//!
//! Turns trade intents into contract orders. Paper mode records a simulated
//! trade without touching the venue; live mode sends a proposal followed
//! immediately by a buy for the same parameters. There are no retries: a
//! failed order becomes an error alert and the intent is dropped.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::alerts::{Alert, AlertKind, AlertLevel, AlertLog};
use super::session::SharedSession;
use super::stats::Statistics;
use crate::settings::Settings;
use crate::storage::TradeStore;
use crate::types::{ContractRequest, TradeIntent, TradeRecord, WatchError};
use crate::venue::OrderGateway;

/// Currency used for paper trades when no account is authorized.
const PAPER_CURRENCY: &str = "USD";

/// Build the contract order for an intent under the current settings.
pub fn build_request(intent: &TradeIntent, settings: &Settings, currency: &str) -> ContractRequest {
    let auto = &settings.auto_trade_settings;
    ContractRequest {
        symbol: intent.symbol.clone(),
        contract_type: auto.contract_type,
        amount: auto.trade_amount,
        duration: auto.trade_duration,
        currency: currency.to_string(),
        barrier: auto
            .contract_type
            .uses_barrier()
            .then(|| intent.target_digit.to_string()),
    }
}

pub struct TradeExecutor {
    gateway: Arc<dyn OrderGateway>,
    store: Arc<dyn TradeStore>,
    settings: watch::Receiver<Settings>,
    session: SharedSession,
    alerts: Arc<AlertLog>,
    stats: Arc<Statistics>,
}

impl TradeExecutor {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn TradeStore>,
        settings: watch::Receiver<Settings>,
        session: SharedSession,
        alerts: Arc<AlertLog>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            session,
            alerts,
            stats,
        }
    }

    /// Consume intents until the channel closes. Each intent runs on its
    /// own task so a slow order never holds up the next one.
    pub async fn run(self: Arc<Self>, mut intents: mpsc::UnboundedReceiver<TradeIntent>) {
        info!("Trade executor started");
        while let Some(intent) = intents.recv().await {
            let executor = Arc::clone(&self);
            tokio::spawn(async move {
                executor.handle(intent).await;
            });
        }
        info!("Trade executor stopped");
    }

    /// Execute one intent and report the outcome as an alert.
    pub async fn handle(&self, intent: TradeIntent) -> Option<TradeRecord> {
        match self.execute(&intent).await {
            Ok(record) => {
                self.stats.record_trade(true);
                let mode = if record.paper { "PAPER" } else { "LIVE" };
                self.alerts.push(
                    Alert::new(
                        AlertKind::Trade,
                        AlertLevel::Success,
                        format!(
                            "{mode} {} on {} barrier {} x{}t, stake {:.2}",
                            record.contract_type,
                            intent.symbol.label(),
                            intent.target_digit,
                            record.duration,
                            record.amount
                        ),
                    )
                    .about(&intent.symbol, intent.target_digit, intent.cluster_count),
                );
                Some(record)
            }
            Err(e) => {
                self.stats.record_trade(false);
                self.alerts.push(
                    Alert::new(
                        AlertKind::Trade,
                        AlertLevel::Error,
                        format!("Auto-trade failed for {}: {e:#}", intent.symbol.label()),
                    )
                    .about(&intent.symbol, intent.target_digit, intent.cluster_count),
                );
                None
            }
        }
    }

    /// Place (or simulate) the order for an intent and record it.
    pub async fn execute(&self, intent: &TradeIntent) -> Result<TradeRecord> {
        let settings = self.settings.borrow().clone();
        settings.validate()?;
        let paper = settings.paper_trading();

        let currency = {
            let session = self.session.read();
            match session.currency() {
                Some(c) => c.to_string(),
                None if paper => PAPER_CURRENCY.to_string(),
                None => {
                    return Err(WatchError::Order {
                        symbol: intent.symbol.to_string(),
                        message: "no authorized account".into(),
                    }
                    .into())
                }
            }
        };

        let request = build_request(intent, &settings, &currency);

        if paper {
            info!(
                symbol = %request.symbol,
                digit = %intent.target_digit,
                amount = format!("{:.2} {}", request.amount, request.currency),
                "[PAPER] Would place {}", request.contract_type
            );
        } else {
            debug!(order = %request, "Sending proposal and buy");
            self.gateway
                .propose(&request)
                .await
                .context("Proposal request failed")?;
            self.gateway
                .buy(&request)
                .await
                .context("Buy request failed")?;
            info!(
                symbol = %request.symbol,
                digit = %intent.target_digit,
                amount = format!("{:.2} {}", request.amount, request.currency),
                "Order sent"
            );
        }

        let mut record = TradeRecord::from_request(&request, intent.target_digit, paper);
        match self.store.record_trade(&record).await {
            Ok(id) => record.id = Some(id),
            Err(e) => {
                // The order is already out; losing the history row is not a
                // trade failure.
                warn!(symbol = %request.symbol, error = %e, "Failed to record trade");
            }
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::{shared_session, Session};
    use crate::storage::MockTradeStore;
    use crate::types::{Account, ContractType, Digit, Symbol};
    use crate::venue::MockOrderGateway;
    use chrono::Utc;
    use mockall::predicate::always;
    use mockall::Sequence;
    use rust_decimal_macros::dec;

    fn intent() -> TradeIntent {
        TradeIntent {
            symbol: Symbol::from("R_25"),
            target_digit: Digit::new(7).unwrap(),
            cluster_count: 5,
            timestamp: Utc::now(),
        }
    }

    fn settings(paper: bool) -> Settings {
        let mut s = Settings::default();
        s.connection_settings.auto_trade = true;
        s.paper_settings.enabled = paper;
        s.auto_trade_settings.trade_amount = dec!(2);
        s.auto_trade_settings.trade_duration = 3;
        s
    }

    fn authorized() -> SharedSession {
        let session = shared_session();
        *session.write() = Session {
            connected: true,
            account: Some(Account {
                loginid: "CR900".into(),
                currency: "EUR".into(),
                balance: dec!(100),
            }),
        };
        session
    }

    fn executor(
        gateway: MockOrderGateway,
        store: MockTradeStore,
        settings: Settings,
        session: SharedSession,
    ) -> (TradeExecutor, Arc<AlertLog>, Arc<Statistics>) {
        let (_tx, rx) = watch::channel(settings);
        let alerts = Arc::new(AlertLog::default());
        let stats = Arc::new(Statistics::new());
        let exec = TradeExecutor::new(
            Arc::new(gateway),
            Arc::new(store),
            rx,
            session,
            alerts.clone(),
            stats.clone(),
        );
        (exec, alerts, stats)
    }

    #[test]
    fn test_build_request_differs() {
        let req = build_request(&intent(), &settings(false), "USD");
        assert_eq!(req.contract_type, ContractType::DigitDiffers);
        assert_eq!(req.barrier.as_deref(), Some("7"));
        assert_eq!(req.amount, dec!(2));
        assert_eq!(req.duration, 3);
        assert_eq!(req.currency, "USD");
    }

    #[test]
    fn test_build_request_even_has_no_barrier() {
        let mut s = settings(false);
        s.auto_trade_settings.contract_type = ContractType::DigitEven;
        let req = build_request(&intent(), &s, "USD");
        assert!(req.barrier.is_none());
    }

    #[tokio::test]
    async fn test_paper_trade_skips_gateway() {
        let mut gateway = MockOrderGateway::new();
        gateway.expect_propose().never();
        gateway.expect_buy().never();
        let mut store = MockTradeStore::new();
        store
            .expect_record_trade()
            .withf(|t| t.paper && t.target_digit == 7 && t.contract_type == "DIGITDIFF")
            .times(1)
            .returning(|_| Ok(11));

        let (exec, alerts, stats) = executor(gateway, store, settings(true), shared_session());
        let record = exec.handle(intent()).await.unwrap();

        assert_eq!(record.id, Some(11));
        assert!(record.paper);
        assert_eq!(stats.snapshot().trades_executed, 1);
        assert_eq!(alerts.recent(1)[0].level, AlertLevel::Success);
    }

    #[tokio::test]
    async fn test_live_trade_proposes_then_buys() {
        let mut seq = Sequence::new();
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_propose()
            .withf(|r| r.currency == "EUR" && r.barrier.as_deref() == Some("7"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        gateway
            .expect_buy()
            .with(always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut store = MockTradeStore::new();
        store
            .expect_record_trade()
            .withf(|t| !t.paper)
            .times(1)
            .returning(|_| Ok(1));

        let (exec, _alerts, _stats) = executor(gateway, store, settings(false), authorized());
        let record = exec.execute(&intent()).await.unwrap();
        assert!(!record.paper);
        assert_eq!(record.amount, dec!(2));
    }

    #[tokio::test]
    async fn test_failed_proposal_is_not_retried() {
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_propose()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("socket closed")));
        gateway.expect_buy().never();
        let mut store = MockTradeStore::new();
        store.expect_record_trade().never();

        let (exec, alerts, stats) = executor(gateway, store, settings(false), authorized());
        assert!(exec.handle(intent()).await.is_none());

        let alert = &alerts.recent(1)[0];
        assert_eq!(alert.level, AlertLevel::Error);
        assert!(alert.message.contains("socket closed"));
        assert_eq!(stats.snapshot().trades_failed, 1);
    }

    #[tokio::test]
    async fn test_live_without_account_fails() {
        let mut gateway = MockOrderGateway::new();
        gateway.expect_propose().never();
        let store = MockTradeStore::new();

        let (exec, _alerts, _stats) =
            executor(gateway, store, settings(false), shared_session());
        let err = exec.execute(&intent()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WatchError>(),
            Some(WatchError::Order { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_failure_still_counts_trade() {
        let gateway = MockOrderGateway::new();
        let mut store = MockTradeStore::new();
        store
            .expect_record_trade()
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let (exec, _alerts, stats) = executor(gateway, store, settings(true), shared_session());
        let record = exec.handle(intent()).await.unwrap();
        assert!(record.id.is_none());
        assert_eq!(stats.snapshot().trades_executed, 1);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let gateway = MockOrderGateway::new();
        let mut store = MockTradeStore::new();
        store.expect_record_trade().times(2).returning(|_| Ok(1));

        let (exec, _alerts, stats) = executor(gateway, store, settings(true), shared_session());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(intent()).unwrap();
        tx.send(intent()).unwrap();
        drop(tx);

        Arc::new(exec).run(rx).await;
        // Spawned tasks finish shortly after the loop ends.
        for _ in 0..50 {
            if stats.snapshot().trades_executed == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stats.snapshot().trades_executed, 2);
    }
}
