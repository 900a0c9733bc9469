use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zaif_core::*;

use crate::config::StreamConfig;
use crate::connection::WsConnector;

/// Everything the manager shares with its spawned tasks, behind one lock.
struct Registry {
    state: ManagerState,
    subscriptions: HashMap<TradingPair, mpsc::Sender<StreamEvent>>,
    connections: HashMap<TradingPair, Arc<dyn Connection>>,
    /// Cancelled to end the current reception session.
    session: Option<CancellationToken>,
    /// Bumped by every `receive` and `reset`. A session only tears down
    /// registry state while the generation is still its own.
    generation: u64,
}

/// Fans market streams out to per-pair subscriber channels.
///
/// Subscriptions are registered while idle; `receive` then dials one
/// connection per pair and forwards every decoded event to that pair's
/// channel until cancelled, closed, or until any connection fails. A failure
/// on one pair tears down the whole session.
///
/// Delivery channels close once reception ends: `recv()` on the subscriber
/// side yields `None` after the last event.
pub struct StreamManager {
    connector: Arc<dyn Connector>,
    inner: Arc<Mutex<Registry>>,
}

impl StreamManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            inner: Arc::new(Mutex::new(Registry {
                state: ManagerState::Idle,
                subscriptions: HashMap::new(),
                connections: HashMap::new(),
                session: None,
                generation: 0,
            })),
        }
    }

    /// A manager backed by real WebSocket connections.
    pub fn with_config(config: StreamConfig) -> Self {
        Self::new(Arc::new(WsConnector::new(config)))
    }

    pub async fn state(&self) -> ManagerState {
        self.inner.lock().await.state
    }

    /// Registered pairs, sorted.
    pub async fn subscriptions(&self) -> Vec<TradingPair> {
        let inner = self.inner.lock().await;
        let mut pairs: Vec<TradingPair> = inner.subscriptions.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    /// Register (or replace) the delivery channel for `pair`.
    ///
    /// Only legal while idle: the pair set is fixed once reception starts.
    pub async fn add_subscription(
        &self,
        pair: impl Into<TradingPair>,
        sender: mpsc::Sender<StreamEvent>,
    ) -> Result<(), StreamError> {
        let pair = pair.into();
        let mut inner = self.inner.lock().await;
        if inner.state != ManagerState::Idle {
            return Err(StreamError::RegistryFrozen(inner.state));
        }
        if inner.subscriptions.insert(pair.clone(), sender).is_some() {
            debug!(pair = %pair, "Replaced existing subscription");
        }
        Ok(())
    }

    /// Stream every registered pair until `cancel` fires, `close` is called,
    /// or a connection fails.
    ///
    /// Returns the first connection failure, or `Ok(())` when reception
    /// ended through cancellation. Callable once per idle period.
    pub async fn receive(&self, cancel: CancellationToken) -> Result<(), StreamError> {
        let (session, generation, subscriptions) = {
            let mut inner = self.inner.lock().await;
            if inner.state != ManagerState::Idle {
                return Err(StreamError::AlreadyStarted);
            }
            inner.state = ManagerState::Connecting;
            inner.generation += 1;
            // A child token: a failing loop ends this session without
            // cancelling the caller's token.
            let session = cancel.child_token();
            inner.session = Some(session.clone());
            let subscriptions: Vec<(TradingPair, mpsc::Sender<StreamEvent>)> = inner
                .subscriptions
                .iter()
                .map(|(pair, sender)| (pair.clone(), sender.clone()))
                .collect();
            (session, inner.generation, subscriptions)
        };
        info!(pairs = subscriptions.len(), "Starting market stream reception");

        let connections = match self.dial_all(&subscriptions).await {
            Ok(connections) => connections,
            Err(err) => {
                warn!(error = %err, "Dial failed, aborting reception");
                drop(subscriptions);
                self.release(Some(generation)).await;
                return Err(err);
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation
                || inner.state == ManagerState::Closed
                || session.is_cancelled()
            {
                drop(inner);
                info!("Reception cancelled while connecting");
                close_all(connections).await;
                self.release(Some(generation)).await;
                return Ok(());
            }
            for connection in &connections {
                inner
                    .connections
                    .insert(connection.pair().clone(), connection.clone());
            }
            inner.state = ManagerState::Receiving;
        }

        let teardown = tokio::spawn(teardown(
            self.inner.clone(),
            session.clone(),
            generation,
            connections.clone(),
        ));
        let mut loops = JoinSet::new();
        for ((_, sender), connection) in subscriptions.into_iter().zip(connections) {
            loops.spawn(receive_loop(connection, sender, session.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(e) => {
                    warn!(error = %e, "Receive loop panicked, cancelling session");
                    session.cancel();
                    first_error.get_or_insert(StreamError::TaskFailed(e.to_string()));
                }
            }
        }

        // Every loop has stopped; nothing can write to a channel any more.
        session.cancel();
        if let Err(e) = teardown.await {
            warn!(error = %e, "Teardown task panicked");
        }
        self.release(Some(generation)).await;

        match first_error {
            Some(err) => {
                warn!(error = %err, "Market stream reception failed");
                Err(err)
            }
            None => {
                info!("Market stream reception finished");
                Ok(())
            }
        }
    }

    /// Stop reception, close every connection and every delivery channel.
    ///
    /// Idempotent, and safe to call while `receive` is running.
    pub async fn close(&self) -> Result<(), StreamError> {
        let previous = self.state().await;
        self.release(None).await;
        if previous != ManagerState::Closed {
            info!(previous = %previous, "Stream manager closed");
        }
        Ok(())
    }

    /// Return a closed manager to idle with an empty registry.
    pub async fn reset(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ManagerState::Closed {
            return Err(StreamError::NotClosed(inner.state));
        }
        inner.state = ManagerState::Idle;
        // Detach any reception still winding down from the new registry.
        inner.generation += 1;
        inner.subscriptions.clear();
        inner.connections.clear();
        inner.session = None;
        Ok(())
    }

    /// Dial every pair; on the first failure close what was already opened.
    async fn dial_all(
        &self,
        subscriptions: &[(TradingPair, mpsc::Sender<StreamEvent>)],
    ) -> Result<Vec<Arc<dyn Connection>>, StreamError> {
        let mut connections = Vec::with_capacity(subscriptions.len());
        for (pair, _) in subscriptions {
            match self.connector.dial(pair).await {
                Ok(connection) => connections.push(connection),
                Err(err) => {
                    close_all(connections).await;
                    return Err(err);
                }
            }
        }
        Ok(connections)
    }

    /// Mark closed, end the session, and drop every connection and
    /// registry-held sender.
    ///
    /// With `Some(generation)` nothing happens unless that session still
    /// owns the registry; `None` always releases.
    async fn release(&self, generation: Option<u64>) {
        let connections: Vec<Arc<dyn Connection>> = {
            let mut inner = self.inner.lock().await;
            if generation.is_some_and(|g| g != inner.generation) {
                debug!("Registry belongs to a newer session, skipping release");
                return;
            }
            inner.state = ManagerState::Closed;
            if let Some(session) = inner.session.take() {
                session.cancel();
            }
            inner.subscriptions.clear();
            inner.connections.drain().map(|(_, c)| c).collect()
        };
        close_all(connections).await;
    }
}

/// Forward events from one connection to its subscriber until the session
/// ends or the connection fails.
async fn receive_loop(
    connection: Arc<dyn Connection>,
    sender: mpsc::Sender<StreamEvent>,
    session: CancellationToken,
) -> Result<(), StreamError> {
    let pair = connection.pair().clone();
    debug!(pair = %pair, "Receive loop started");

    while !session.is_cancelled() {
        let event = match connection.receive_one().await {
            Ok(event) => event,
            Err(err) => {
                // Closing connections is how teardown wakes blocked reads.
                if session.is_cancelled() {
                    debug!(pair = %pair, error = %err, "Connection ended during teardown");
                    return Ok(());
                }
                warn!(pair = %pair, error = %err, "Receive loop failed, cancelling session");
                session.cancel();
                return Err(err);
            }
        };

        if session.is_cancelled() {
            continue;
        }
        tokio::select! {
            biased;
            _ = session.cancelled() => {}
            sent = sender.send(event) => {
                if sent.is_err() {
                    info!(pair = %pair, "Subscriber dropped its receiver, stopping stream");
                    connection.close().await;
                    return Ok(());
                }
            }
        }
    }

    debug!(pair = %pair, "Receive loop stopped");
    Ok(())
}

/// Close the session's connections once it ends.
async fn teardown(
    inner: Arc<Mutex<Registry>>,
    session: CancellationToken,
    generation: u64,
    connections: Vec<Arc<dyn Connection>>,
) {
    session.cancelled().await;
    {
        let mut inner = inner.lock().await;
        if inner.generation == generation {
            inner.connections.clear();
        }
    }
    if !connections.is_empty() {
        info!(connections = connections.len(), "Tearing down market streams");
    }
    close_all(connections).await;
}

async fn close_all(connections: Vec<Arc<dyn Connection>>) {
    join_all(connections.iter().map(|c| c.close())).await;
}
