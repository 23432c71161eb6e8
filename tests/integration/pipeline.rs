//! Feed → monitor → dispatcher → executor → store, wired the way the binary
//! wires them, with the venue and store replaced by in-memory doubles.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use digitwatch::engine::{
    shared_session, AlertKind, AlertLevel, AlertLog, IsolationPolicy, Monitor, MonitorParts,
    PatternEvent, SharedSession, Statistics, TradeExecutor,
};
use digitwatch::settings::Settings;
use digitwatch::storage::Storage;
use digitwatch::types::{Account, Symbol, Tick, TradeIntent};
use digitwatch::venue::{ConnectionStatus, FeedEvent, FeedMessage};

use crate::mock_gateway::{MemoryStore, OrderCall, RecordingGateway};

/// Two clusters of 7, then an isolated 7 confirmed by the next digit.
const TRIGGER_R10: &[u8] = &[7, 7, 5, 7, 7, 9, 7, 3];

struct Pipeline {
    monitor: Monitor,
    intents: mpsc::UnboundedReceiver<TradeIntent>,
    settings: watch::Sender<Settings>,
    settings_rx: watch::Receiver<Settings>,
    session: SharedSession,
    alerts: Arc<AlertLog>,
    stats: Arc<Statistics>,
}

impl Pipeline {
    fn new(auto_trade: bool, paper: bool) -> Self {
        let mut settings = Settings::default();
        settings.connection_settings.auto_trade = auto_trade;
        settings.paper_settings.enabled = paper;
        settings.auto_trade_settings.min_cluster_size = 2;
        settings.auto_trade_settings.trade_amount = dec!(0.5);

        let (settings_tx, settings_rx) = watch::channel(settings);
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let session = shared_session();
        let alerts = Arc::new(AlertLog::default());
        let stats = Arc::new(Statistics::new());

        let mut monitor = Monitor::new(MonitorParts {
            symbols: vec![Symbol::from("R_10"), Symbol::from("R_25")],
            history_window: 50,
            isolation: IsolationPolicy::Confirmed,
            settings: settings_rx.clone(),
            session: session.clone(),
            alerts: alerts.clone(),
            stats: stats.clone(),
            intents: intent_tx,
        });
        monitor.precisions_mut().set(Symbol::from("R_10"), 0);
        monitor.precisions_mut().set(Symbol::from("R_25"), 0);

        Self {
            monitor,
            intents: intent_rx,
            settings: settings_tx,
            settings_rx,
            session,
            alerts,
            stats,
        }
    }

    fn executor(
        &self,
        gateway: Arc<RecordingGateway>,
        store: Arc<dyn digitwatch::storage::TradeStore>,
    ) -> TradeExecutor {
        TradeExecutor::new(
            gateway,
            store,
            self.settings_rx.clone(),
            self.session.clone(),
            self.alerts.clone(),
            self.stats.clone(),
        )
    }

    fn connect(&mut self, account: Option<Account>) {
        self.monitor
            .handle(FeedMessage::Status(ConnectionStatus::Connected));
        if let Some(account) = account {
            self.monitor
                .handle(FeedMessage::Event(FeedEvent::Authorized(account)));
        }
    }

    fn feed(&mut self, symbol: &str, digits: &[u8]) -> Vec<PatternEvent> {
        digits
            .iter()
            .flat_map(|&d| self.monitor.handle(tick(symbol, d)))
            .collect()
    }

    fn drain_intents(&mut self) -> Vec<TradeIntent> {
        let mut out = Vec::new();
        while let Ok(intent) = self.intents.try_recv() {
            out.push(intent);
        }
        out
    }
}

fn tick(symbol: &str, digit: u8) -> FeedMessage {
    FeedMessage::Event(FeedEvent::Tick {
        tick: Tick {
            symbol: Symbol::from(symbol),
            quote: 2000.0 + digit as f64,
            epoch: 1_700_000_000,
        },
        pip_size: None,
    })
}

fn live_account() -> Account {
    Account {
        loginid: "CR123456".into(),
        currency: "USD".into(),
        balance: dec!(250),
    }
}

#[tokio::test]
async fn test_paper_trade_recorded_without_orders() {
    let mut p = Pipeline::new(true, true);
    p.connect(None);
    p.feed("R_10", TRIGGER_R10);

    let intents = p.drain_intents();
    assert_eq!(intents.len(), 1);

    let gateway = RecordingGateway::new();
    let store = MemoryStore::new();
    let executor = p.executor(gateway.clone(), store.clone());
    let record = executor.handle(intents[0].clone()).await.unwrap();

    assert!(record.paper);
    assert_eq!(record.target_digit, 7);
    assert_eq!(record.amount, dec!(0.5));
    assert!(gateway.calls().is_empty());
    assert_eq!(store.trades().len(), 1);
    assert_eq!(p.stats.snapshot().trades_executed, 1);
}

#[tokio::test]
async fn test_live_trade_proposes_then_buys() {
    let mut p = Pipeline::new(true, false);
    p.connect(Some(live_account()));
    p.feed("R_10", TRIGGER_R10);

    let intents = p.drain_intents();
    assert_eq!(intents.len(), 1);

    let gateway = RecordingGateway::new();
    let store = MemoryStore::new();
    let executor = p.executor(gateway.clone(), store.clone());
    let record = executor.handle(intents[0].clone()).await.unwrap();
    assert!(!record.paper);

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, OrderCall::Propose);
    assert_eq!(calls[1].0, OrderCall::Buy);
    let request = &calls[1].1;
    assert_eq!(request.symbol.as_str(), "R_10");
    assert_eq!(request.barrier.as_deref(), Some("7"));
    assert_eq!(request.currency, "USD");
    assert_eq!(request.amount, dec!(0.5));

    let trades = store.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].contract_type, "DIGITDIFF");
}

#[tokio::test]
async fn test_live_trade_without_account_not_dispatched() {
    let mut p = Pipeline::new(true, false);
    p.connect(None);
    let events = p.feed("R_10", TRIGGER_R10);

    assert!(events.iter().any(|e| matches!(e, PatternEvent::Triggered(_))));
    assert!(p.drain_intents().is_empty());
    assert_eq!(p.stats.snapshot().triggers, 1);
}

#[tokio::test]
async fn test_auto_trade_off_only_alerts() {
    let mut p = Pipeline::new(false, true);
    p.connect(None);
    p.feed("R_10", TRIGGER_R10);

    assert!(p.drain_intents().is_empty());
    let signals: Vec<_> = p
        .alerts
        .recent(100)
        .into_iter()
        .filter(|a| a.kind == AlertKind::Signal)
        .collect();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].digit.map(|d| d.value()), Some(7));
}

#[tokio::test]
async fn test_disabling_auto_trade_takes_effect_immediately() {
    let mut p = Pipeline::new(true, true);
    p.connect(None);
    p.settings
        .send_modify(|s| s.connection_settings.auto_trade = false);
    p.feed("R_10", TRIGGER_R10);
    assert!(p.drain_intents().is_empty());
}

#[tokio::test]
async fn test_interleaved_symbols_are_isolated() {
    let mut p = Pipeline::new(true, true);
    p.connect(None);

    // R_25 sees the same digits but never two 7s in a row.
    let r25 = [7, 5, 7, 9, 7, 3, 7, 1];
    for (i, &d) in TRIGGER_R10.iter().enumerate() {
        p.feed("R_10", &[d]);
        p.feed("R_25", &[r25[i]]);
    }

    let intents = p.drain_intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].symbol.as_str(), "R_10");
    assert_eq!(p.stats.snapshot().ticks_processed, 16);
}

#[tokio::test]
async fn test_gateway_failure_reported_and_not_stored() {
    let mut p = Pipeline::new(true, false);
    p.connect(Some(live_account()));
    p.feed("R_10", TRIGGER_R10);
    let intent = p.drain_intents().remove(0);

    let gateway = RecordingGateway::new();
    gateway.set_error("socket closed");
    let store = MemoryStore::new();
    let executor = p.executor(gateway, store.clone());

    assert!(executor.handle(intent).await.is_none());
    assert!(store.trades().is_empty());

    let snap = p.stats.snapshot();
    assert_eq!(snap.trades_failed, 1);
    assert_eq!(snap.trades_executed, 0);
    let latest = &p.alerts.recent(1)[0];
    assert_eq!(latest.kind, AlertKind::Trade);
    assert_eq!(latest.level, AlertLevel::Error);
}

#[tokio::test]
async fn test_paper_trade_lands_in_sqlite() {
    let mut p = Pipeline::new(true, true);
    p.connect(None);
    p.feed("R_10", TRIGGER_R10);
    let intent = p.drain_intents().remove(0);

    let storage = Storage::in_memory().await.unwrap();
    let executor = p.executor(RecordingGateway::new(), Arc::new(storage.clone()));
    executor.handle(intent).await.unwrap();

    let trades = storage.recent_trades(None).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].symbol, "R_10");
    assert!(trades[0].paper);
    assert!(trades[0].id.is_some());
}

#[tokio::test]
async fn test_running_tasks_end_to_end() {
    let p = Pipeline::new(true, true);
    let store = MemoryStore::new();
    let executor = Arc::new(p.executor(RecordingGateway::new(), store.clone()));
    let Pipeline {
        monitor, intents, ..
    } = p;

    let executor_task = tokio::spawn(executor.run(intents));

    let (feed_tx, feed_rx) = mpsc::channel(64);
    feed_tx
        .send(FeedMessage::Status(ConnectionStatus::Connected))
        .await
        .unwrap();
    for &d in TRIGGER_R10 {
        feed_tx.send(tick("R_10", d)).await.unwrap();
    }
    drop(feed_tx);

    // Returns once the feed closes; dropping the monitor closes the intents.
    monitor.run(feed_rx).await;
    executor_task.await.unwrap();

    // Each intent runs on its own task; give it a moment to land.
    let landed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if !store.trades().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(landed.is_ok());
    assert_eq!(store.trades().len(), 1);
}
