//! Deriv WebSocket client.
//!
//! One long-lived task owns the socket: it connects, authorizes, requests
//! symbol metadata, subscribes to ticks, keeps the connection alive with
//! `{"ping":1}` and forwards parsed frames in arrival order. On disconnect it
//! reconnects with a growing delay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::messages;
use super::{FeedEvent, OrderGateway};
use crate::types::{ContractRequest, Symbol, WatchError};

/// Default Deriv endpoint.
pub const DEFAULT_URL: &str = "wss://ws.derivws.com/websockets/v3";

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub app_id: String,
    pub token: Option<SecretString>,
    pub symbols: Vec<Symbol>,
    /// Gap between successive tick subscriptions.
    pub subscribe_spacing: Duration,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub channel_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            app_id: "1089".to_string(),
            token: None,
            symbols: ["R_10", "R_25", "R_50", "R_75", "R_100"]
                .into_iter()
                .map(Symbol::from)
                .collect(),
            subscribe_spacing: Duration::from_millis(200),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            channel_buffer_size: 1000,
        }
    }
}

impl FeedConfig {
    /// Endpoint with the application id attached.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.url, urlencoding::encode(&self.app_id))
    }
}

/// Delay before the next reconnect attempt.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.mul_f64(1.5).min(max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Everything the client reports, on one ordered channel so a status change
/// is never overtaken by ticks from the next connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(ConnectionStatus),
    Event(FeedEvent),
}

// ---------------------------------------------------------------------------
// Handle (outbound side)
// ---------------------------------------------------------------------------

/// Cloneable sender for requests on the live connection.
#[derive(Clone)]
pub struct FeedHandle {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl FeedHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue a request. Fails when no connection is up, so nothing queued
    /// now is replayed on a later connection.
    pub fn send(&self, request: &Value) -> Result<()> {
        if !self.is_connected() {
            return Err(WatchError::Feed("not connected".into()).into());
        }
        self.outbound
            .send(request.to_string())
            .map_err(|_| WatchError::Feed("feed task stopped".into()))?;
        Ok(())
    }
}

#[async_trait]
impl OrderGateway for FeedHandle {
    async fn propose(&self, request: &ContractRequest) -> Result<()> {
        self.send(&messages::proposal(request))
            .context(format!("Failed to send proposal for {}", request.symbol))
    }

    async fn buy(&self, request: &ContractRequest) -> Result<()> {
        self.send(&messages::buy(request))
            .context(format!("Failed to send buy for {}", request.symbol))
    }
}

// ---------------------------------------------------------------------------
// Client (connection task)
// ---------------------------------------------------------------------------

pub struct DerivClient {
    config: FeedConfig,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
}

impl DerivClient {
    pub fn new(config: FeedConfig) -> (Self, FeedHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let handle = FeedHandle {
            outbound: outbound_tx,
            connected: connected.clone(),
        };
        (
            Self {
                config,
                outbound_rx,
                connected,
            },
            handle,
        )
    }

    /// Spawn the connection task. It runs until `shutdown` flips to true or
    /// the returned receiver is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> mpsc::Receiver<FeedMessage> {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        tokio::spawn(self.run(tx, shutdown));
        rx
    }

    async fn run(mut self, tx: mpsc::Sender<FeedMessage>, mut shutdown: watch::Receiver<bool>) {
        let endpoint = self.config.endpoint();
        let mut delay = self.config.reconnect_delay;
        info!(url = %self.config.url, symbols = self.config.symbols.len(), "Starting feed client");

        loop {
            if tx
                .send(FeedMessage::Status(ConnectionStatus::Reconnecting))
                .await
                .is_err()
            {
                return;
            }

            match connect_async(endpoint.as_str()).await {
                Ok((stream, _)) => {
                    delay = self.config.reconnect_delay;
                    let stop = self.session(stream, &tx, &mut shutdown).await;
                    self.connected.store(false, Ordering::Release);
                    let _ = tx
                        .send(FeedMessage::Status(ConnectionStatus::Disconnected))
                        .await;
                    if stop {
                        info!("Feed client stopped");
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to feed");
                    let _ = tx
                        .send(FeedMessage::Status(ConnectionStatus::Disconnected))
                        .await;
                }
            }

            warn!(delay_ms = delay.as_millis() as u64, "Reconnecting to feed");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
            delay = next_backoff(delay, self.config.max_reconnect_delay);
        }
    }

    /// Drive one connection. Returns true when the client should stop for
    /// good rather than reconnect.
    async fn session<S>(
        &mut self,
        stream: S,
        tx: &mpsc::Sender<FeedMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = stream.split();

        // Orders queued against the previous connection are stale.
        let mut stale = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            warn!(dropped = stale, "Discarded requests queued while disconnected");
        }

        info!("Connected to feed");
        self.connected.store(true, Ordering::Release);
        if tx
            .send(FeedMessage::Status(ConnectionStatus::Connected))
            .await
            .is_err()
        {
            return true;
        }

        if let Err(e) = self.open(&mut write).await {
            error!(error = %e, "Feed handshake failed");
            return false;
        }

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match messages::parse_inbound(text.as_str()) {
                                Ok(Some(event)) => {
                                    if matches!(event, FeedEvent::Authorized(_)) {
                                        let balance = messages::balance_subscribe().to_string();
                                        let sent = write.send(Message::Text(balance.into())).await;
                                        if sent.is_err() {
                                            return false;
                                        }
                                    }
                                    if tx.send(FeedMessage::Event(event)).await.is_err() {
                                        warn!("Feed receiver dropped, stopping client");
                                        return true;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    warn!(error = %e, "Dropping feed frame");
                                    debug!(raw = %text.as_str(), "Raw frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Feed closed by server");
                            return false;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "Feed socket error");
                            return false;
                        }
                    }
                }
                Some(request) = self.outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(request.into())).await {
                        error!(error = %e, "Failed to send request");
                        return false;
                    }
                }
                _ = ping.tick() => {
                    let ping_frame = messages::ping().to_string();
                    if write.send(Message::Text(ping_frame.into())).await.is_err() {
                        debug!("Ping failed, connection likely dead");
                        return false;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return true;
                    }
                }
            }
        }
    }

    /// Authorize, fetch symbol metadata and subscribe to every symbol.
    async fn open<W>(&self, write: &mut W) -> Result<()>
    where
        W: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if let Some(token) = &self.config.token {
            let msg = messages::authorize(token.expose_secret());
            write
                .send(Message::Text(msg.to_string().into()))
                .await
                .context("Failed to send authorize")?;
        } else {
            debug!("No API token configured, running unauthorized");
        }

        write
            .send(Message::Text(messages::active_symbols().to_string().into()))
            .await
            .context("Failed to request active symbols")?;

        for (i, symbol) in self.config.symbols.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.subscribe_spacing).await;
            }
            let msg = messages::ticks_subscribe(symbol, i as u64 + 1);
            write
                .send(Message::Text(msg.to_string().into()))
                .await
                .context(format!("Failed to subscribe to {symbol}"))?;
            debug!(symbol = %symbol, "Subscribed to ticks");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
