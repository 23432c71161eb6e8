//! DIGITWATCH entry point.
//!
//! Loads configuration, initialises structured logging, opens the database,
//! then runs the feed client, the tick pipeline, the trade executor and the
//! dashboard until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use digitwatch::config::AppConfig;
use digitwatch::dashboard::{self, DashboardState};
use digitwatch::engine::{
    shared_session, AlertLog, Monitor, MonitorParts, Statistics, TradeExecutor,
};
use digitwatch::storage::Storage;
use digitwatch::venue::DerivClient;

const BANNER: &str = r#"
 ____  ___ ____ ___ _______        ___  _____ ____ _   _
|  _ \|_ _/ ___|_ _|_   _\ \      / / \|_   _/ ___| | | |
| | | || | |  _ | |  | |  \ \ /\ / / _ \ | || |   | |_| |
| |_| || | |_| || |  | |   \ V  V / ___ \| || |___|  _  |
|____/|___\____|___| |_|    \_/\_/_/   \_\_| \____|_| |_|

  Digit cluster monitor and auto-trader
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("DIGITWATCH_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load_or_default(&config_path)?;

    println!("{BANNER}");
    info!(
        symbols = ?cfg.feed.symbols,
        window = cfg.engine.history_window,
        isolation = ?cfg.engine.isolation,
        "DIGITWATCH starting up"
    );

    // -- Shared state ----------------------------------------------------

    let storage = Storage::open(&cfg.storage.database_path).await?;
    let settings = storage.load_settings().await.unwrap_or_else(|e| {
        warn!(error = %e, "Stored settings unreadable, using defaults");
        Default::default()
    });
    info!(
        auto_trade = settings.auto_trade_enabled(),
        paper = settings.paper_trading(),
        min_clusters = settings.min_cluster_size(),
        "Settings loaded"
    );

    let (settings_tx, settings_rx) = watch::channel(settings);
    let session = shared_session();
    let alerts = Arc::new(AlertLog::new(cfg.engine.alert_log_capacity));
    let stats = Arc::new(Statistics::new());
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();

    let token = cfg.api_token();
    if token.is_none() {
        warn!(
            env = %cfg.feed.api_token_env,
            "No API token configured, live trading unavailable"
        );
    }

    // -- Components ------------------------------------------------------

    let (client, handle) = DerivClient::new(cfg.feed_config());

    let executor = Arc::new(TradeExecutor::new(
        Arc::new(handle),
        Arc::new(storage.clone()),
        settings_rx.clone(),
        session.clone(),
        alerts.clone(),
        stats.clone(),
    ));
    tokio::spawn(executor.run(intent_rx));

    let monitor = Monitor::new(MonitorParts {
        symbols: cfg.symbols(),
        history_window: cfg.engine.history_window,
        isolation: cfg.engine.isolation,
        settings: settings_rx,
        session: session.clone(),
        alerts: alerts.clone(),
        stats: stats.clone(),
        intents: intent_tx,
    });

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState {
            storage: storage.clone(),
            settings: settings_tx,
            registry: monitor.registry(),
            alerts,
            stats,
            session,
            token,
            started: chrono::Utc::now(),
        });
        if let Err(e) = dashboard::spawn_dashboard(state, cfg.dashboard.port) {
            error!(error = %e, "Failed to start dashboard");
        }
    }

    // -- Run -------------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = client.start(shutdown_rx);

    info!("Entering main loop. Press Ctrl+C to stop.");
    tokio::select! {
        _ = monitor.run(feed) => {
            warn!("Feed closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    let _ = shutdown_tx.send(true);
    info!("DIGITWATCH shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("digitwatch=info"));

    let json_logging = std::env::var("DIGITWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
