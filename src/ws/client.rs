//! `StreamClient`: the caller-facing streaming client.
//!
//! Owns the connection, the subscription registry and the output queues.
//! Each `connect()` builds a fresh pipeline (router, heartbeat, conversion
//! workers with their reassemblers); `close()` tears it down and waits for
//! every task. Output queues live as long as the client, so consumers keep
//! their handles across reconnects.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{Credentials, LoginScheme};
use crate::domain::account::{AccountUpdate, Balance, Order, Position};
use crate::domain::market::{Candle, Depth, Ticker, Trade};
use crate::error::{AuthError, ConnectionError, SubscriptionError};
use crate::shared::Topic;
use crate::ws::config::WsConfig;
use crate::ws::connection::{Connection, ConnectionState};
use crate::ws::convert::{Converter, StandardConverter};
use crate::ws::fanout::{self, Dispatcher, EventQueue, Job, OutputQueues, StreamStats};
use crate::ws::heartbeat;
use crate::ws::protocol::{JsonProtocol, Protocol};
use crate::ws::router::{PendingLogin, Router};
use crate::ws::subscriptions::{Registry, SubscriptionSpec};
use crate::ws::{MessageOut, SystemError, SystemMessage};

// ─── Session ─────────────────────────────────────────────────────────────────

/// Tasks of one live connection.
struct Session {
    shutdown_tx: watch::Sender<bool>,
    router: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Signal shutdown and wait for every task, aborting any that overrun `timeout`.
    ///
    /// Workers only finish once every `Dispatcher` clone is gone, so the
    /// caller drops its clone first.
    async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        join_bounded("router", self.router, timeout).await;
        join_bounded("heartbeat", self.heartbeat, timeout).await;
        for worker in self.workers {
            join_bounded("conversion worker", worker, timeout).await;
        }
    }

    fn abort(&self) {
        self.router.abort();
        self.heartbeat.abort();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn join_bounded(name: &str, mut handle: JoinHandle<()>, timeout: Duration) {
    if tokio::time::timeout(timeout, &mut handle).await.is_err() {
        tracing::warn!("{} did not stop within {:?}, aborting", name, timeout);
        handle.abort();
    }
}

// ─── StreamClient ────────────────────────────────────────────────────────────

/// Multiplexed streaming client over one WebSocket connection.
///
/// All methods take `&self`; share the client behind an `Arc` to consume
/// queues on other tasks while subscribing.
pub struct StreamClient<P = JsonProtocol, C = StandardConverter> {
    config: WsConfig,
    credentials: Option<Credentials>,
    login_scheme: LoginScheme,
    protocol: Arc<P>,
    converter: Arc<C>,
    conn: Arc<Connection>,
    registry: Arc<Registry>,
    outputs: Arc<OutputQueues>,
    pending_login: PendingLogin,
    session: tokio::sync::Mutex<Option<Session>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl StreamClient {
    /// Client with the JSON envelope protocol and the standard converter. Does not connect yet.
    pub fn new(config: WsConfig) -> Self {
        Self::with_parts(config, JsonProtocol::default(), StandardConverter)
    }
}

impl<P: Protocol, C: Converter> StreamClient<P, C> {
    /// Client with a venue-specific protocol and converter.
    pub fn with_parts(config: WsConfig, protocol: P, converter: C) -> Self {
        let outputs = Arc::new(OutputQueues::new(config.capacity()));
        Self {
            config,
            credentials: None,
            login_scheme: LoginScheme::default(),
            protocol: Arc::new(protocol),
            converter: Arc::new(converter),
            conn: Arc::new(Connection::new()),
            registry: Arc::new(Registry::new()),
            outputs,
            pending_login: PendingLogin::default(),
            session: tokio::sync::Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_login_scheme(mut self, scheme: LoginScheme) -> Self {
        self.login_scheme = scheme;
        self
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Open the socket and start the router, heartbeat and conversion workers.
    ///
    /// Reconnecting after a close or a lost connection starts from scratch:
    /// no subscriptions, no snapshot pages, not authenticated.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut session = self.session.lock().await;
        match self.conn.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Closed => self.reset(&mut session).await,
            _ => return Err(ConnectionError::AlreadyConnected),
        }

        self.conn.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting to {}", self.config.url);
        let source = match self
            .conn
            .open(&self.config.url, self.config.connect_timeout)
            .await
        {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("WebSocket connection failed: {}", e);
                self.conn.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.conn.set_state(ConnectionState::Connected);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, workers) = fanout::spawn_workers(
            &self.config,
            Arc::clone(&self.converter),
            Arc::clone(&self.outputs),
        );
        let router = Router {
            protocol: Arc::clone(&self.protocol),
            conn: Arc::clone(&self.conn),
            registry: Arc::clone(&self.registry),
            dispatcher: dispatcher.clone(),
            outputs: Arc::clone(&self.outputs),
            pending_login: self.pending_login.clone(),
        };
        let router = tokio::spawn(router.run(source, shutdown_rx.clone()));
        let heartbeat = tokio::spawn(heartbeat::run(
            Arc::clone(&self.conn),
            self.config.ping_interval,
            shutdown_rx,
        ));

        *self.lock_dispatcher() = Some(dispatcher);
        *session = Some(Session {
            shutdown_tx,
            router,
            heartbeat,
            workers,
        });
        tracing::info!("Connected to {}", self.config.url);
        Ok(())
    }

    /// Close the connection and wait for every task. Idempotent.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let mut session = self.session.lock().await;
        let state = self.conn.state();
        if session.is_none()
            && matches!(state, ConnectionState::Disconnected | ConnectionState::Closed)
        {
            return Ok(());
        }

        tracing::info!("Closing connection");
        self.conn.set_state(ConnectionState::Closing);
        self.conn.close_sink(self.config.close_timeout).await;
        self.lock_dispatcher().take();
        if let Some(old) = session.take() {
            old.shutdown(self.config.close_timeout).await;
        }

        let cleared = self.registry.clear().await;
        if cleared > 0 {
            tracing::debug!("Cleared {} subscription(s)", cleared);
        }
        self.pending_login.cancel();
        self.conn.set_state(ConnectionState::Closed);
        tracing::info!("Connection closed");
        Ok(())
    }

    /// Tear down what a previous connection left behind.
    async fn reset(&self, session: &mut Option<Session>) {
        self.lock_dispatcher().take();
        if let Some(old) = session.take() {
            old.shutdown(self.config.close_timeout).await;
        }
        let cleared = self.registry.clear().await;
        if cleared > 0 {
            tracing::debug!("Cleared {} subscription(s) from previous connection", cleared);
        }
        self.pending_login.cancel();
        self.conn.drop_sink().await;
        self.conn.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.state().is_connected()
    }

    // ── Authentication ───────────────────────────────────────────────────

    /// Sign and send the login frame, then wait for the venue's acknowledgement.
    pub async fn login(&self) -> Result<(), AuthError> {
        if !self.conn.state().is_connected() {
            return Err(AuthError::NotConnected);
        }
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(AuthError::MissingCredentials)?;
        let ack = self
            .pending_login
            .register()
            .ok_or(AuthError::LoginInFlight)?;

        let timestamp = self.login_scheme.timestamp_now();
        let frame = match self.login_scheme.login_frame(credentials, timestamp) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending_login.cancel();
                return Err(e);
            }
        };
        if let Err(e) = self.conn.send(&frame).await {
            self.pending_login.cancel();
            return Err(AuthError::Send(e));
        }
        tracing::info!("Login sent for key {}", credentials.api_key());

        match tokio::time::timeout(self.config.login_timeout, ack).await {
            Ok(Ok(outcome)) if outcome.success => {
                if self
                    .conn
                    .transition(ConnectionState::Connected, ConnectionState::Authenticated)
                    || self.conn.state().is_authenticated()
                {
                    tracing::info!("Authenticated");
                    Ok(())
                } else {
                    Err(AuthError::NotConnected)
                }
            }
            Ok(Ok(outcome)) => {
                let reason = outcome
                    .message
                    .unwrap_or_else(|| "login rejected".to_string());
                tracing::warn!("Login rejected: {}", reason);
                Err(AuthError::Rejected(reason))
            }
            Ok(Err(_)) => Err(AuthError::NotConnected),
            Err(_) => {
                self.pending_login.cancel();
                tracing::warn!("No login acknowledgement within {:?}", self.config.login_timeout);
                Err(AuthError::Timeout(self.config.login_timeout))
            }
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Bind the topic's decoder and send the subscribe frame.
    ///
    /// Subscribing to a bound topic replaces its decoder and drops any
    /// in-flight snapshot pages.
    pub async fn subscribe(&self, spec: SubscriptionSpec) -> Result<(), SubscriptionError> {
        let state = self.conn.state();
        if !state.is_connected() {
            return Err(SubscriptionError::NotConnected);
        }
        if spec.requires_auth && !state.is_authenticated() {
            return Err(SubscriptionError::AuthRequired(spec.topic));
        }

        let previous = self.registry.bind(&spec).await;
        // Queued ahead of any page the venue sends for the new subscription.
        if previous.is_some() {
            self.discard_pages(&spec.topic);
        }
        if let Err(e) = self.conn.send(&MessageOut::subscribe(spec.topic.clone())).await {
            tracing::warn!("Subscribe to {} not sent: {}", spec.topic, e);
            self.registry.restore(&spec.topic, previous).await;
            return Err(SubscriptionError::Send(e));
        }
        tracing::debug!("Subscribed to {}", spec.topic);
        Ok(())
    }

    /// Remove the binding, drop its in-flight pages and send the unsubscribe frame.
    pub async fn unsubscribe(&self, topic: impl Into<Topic>) -> Result<(), SubscriptionError> {
        let topic = topic.into();
        if !self.conn.state().is_connected() {
            return Err(SubscriptionError::NotConnected);
        }
        if self.registry.remove(&topic).await.is_none() {
            return Err(SubscriptionError::UnknownTopic(topic));
        }
        self.discard_pages(&topic);
        self.conn
            .send(&MessageOut::unsubscribe(topic.clone()))
            .await
            .map_err(SubscriptionError::Send)?;
        tracing::debug!("Unsubscribed from {}", topic);
        Ok(())
    }

    /// Currently bound topics, sorted.
    pub async fn subscriptions(&self) -> Vec<Topic> {
        self.registry.topics().await
    }

    fn discard_pages(&self, topic: &Topic) {
        if let Some(dispatcher) = self.lock_dispatcher().as_ref() {
            dispatcher.dispatch(Job::Discard(topic.clone()));
        }
    }

    fn lock_dispatcher(&self) -> std::sync::MutexGuard<'_, Option<Dispatcher>> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Output queues ────────────────────────────────────────────────────

    pub fn stats(&self) -> StreamStats {
        self.outputs.stats()
    }

    pub fn tickers(&self) -> &EventQueue<Ticker> {
        &self.outputs.tickers
    }

    pub fn depth(&self) -> &EventQueue<Depth> {
        &self.outputs.depth
    }

    pub fn trades(&self) -> &EventQueue<Trade> {
        &self.outputs.trades
    }

    pub fn candles(&self) -> &EventQueue<Candle> {
        &self.outputs.candles
    }

    pub fn orders(&self) -> &EventQueue<Order> {
        &self.outputs.orders
    }

    pub fn balances(&self) -> &EventQueue<Balance> {
        &self.outputs.balances
    }

    pub fn positions(&self) -> &EventQueue<Position> {
        &self.outputs.positions
    }

    /// Reassembled account snapshots.
    pub fn accounts(&self) -> &EventQueue<AccountUpdate> {
        &self.outputs.accounts
    }

    /// Acks and venue notices.
    pub fn system_messages(&self) -> &EventQueue<SystemMessage> {
        &self.outputs.system_messages
    }

    /// Decode failures, reassembly timeouts, venue errors and connection loss.
    pub fn system_errors(&self) -> &EventQueue<SystemError> {
        &self.outputs.system_errors
    }
}

impl<P, C> Drop for StreamClient<P, C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.abort();
        }
    }
}
