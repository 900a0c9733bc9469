//! In-memory connector used by the manager tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use zaif_core::*;

pub(crate) type Frame = Result<StreamEvent, StreamError>;

/// What a fake connection yields from `receive_one`.
pub(crate) enum Script {
    /// Frames pushed by the test; idles once the sender is dropped.
    Frames(mpsc::UnboundedReceiver<Frame>),
    /// A fresh tagged event every millisecond.
    Endless,
    /// Nothing until closed.
    Idle,
    /// Panics on the first read.
    Panic,
}

pub(crate) struct FakeConnection {
    pair: TradingPair,
    script: Mutex<Script>,
    next_tid: AtomicI64,
    close_calls: AtomicUsize,
    closed: CancellationToken,
    /// Token whose cancellation marks later events as late.
    watched: std::sync::Mutex<Option<CancellationToken>>,
    late_tids: std::sync::Mutex<Vec<i64>>,
}

impl FakeConnection {
    fn new(pair: TradingPair, script: Script) -> Self {
        Self {
            pair,
            script: Mutex::new(script),
            next_tid: AtomicI64::new(0),
            close_calls: AtomicUsize::new(0),
            closed: CancellationToken::new(),
            watched: std::sync::Mutex::new(None),
            late_tids: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Record every event produced after `token` is cancelled.
    pub(crate) fn watch(&self, token: CancellationToken) {
        *self.watched.lock().unwrap() = Some(token);
    }

    /// Tids produced after the watched token was cancelled.
    pub(crate) fn late_tids(&self) -> Vec<i64> {
        self.late_tids.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> StreamError {
        StreamError::Transport {
            pair: self.pair.clone(),
            reason: "Connection closed".to_string(),
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn pair(&self) -> &TradingPair {
        &self.pair
    }

    async fn receive_one(&self) -> Result<StreamEvent, StreamError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let mut script = self.script.lock().await;
        match &mut *script {
            Script::Frames(frames) => tokio::select! {
                _ = self.closed.cancelled() => Err(self.closed_error()),
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        self.closed.cancelled().await;
                        Err(self.closed_error())
                    }
                },
            },
            Script::Endless => tokio::select! {
                _ = self.closed.cancelled() => Err(self.closed_error()),
                _ = tokio::time::sleep(Duration::from_millis(1)) => {
                    let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);
                    let late = self
                        .watched
                        .lock()
                        .unwrap()
                        .as_ref()
                        .is_some_and(|token| token.is_cancelled());
                    if late {
                        self.late_tids.lock().unwrap().push(tid);
                    }
                    Ok(tagged_event(&self.pair, tid))
                }
            },
            Script::Idle => {
                self.closed.cancelled().await;
                Err(self.closed_error())
            }
            Script::Panic => panic!("fake connection for {} blew up", self.pair),
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    scripts: std::sync::Mutex<HashMap<TradingPair, Script>>,
    failing: std::sync::Mutex<HashSet<TradingPair>>,
    dialed: std::sync::Mutex<Vec<Arc<FakeConnection>>>,
    gate: std::sync::Mutex<Option<Arc<Semaphore>>>,
}

impl FakeConnector {
    /// Script `pair` with frames pushed through the returned sender.
    pub(crate) fn scripted(&self, pair: &str) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts
            .lock()
            .unwrap()
            .insert(TradingPair::from(pair), Script::Frames(rx));
        tx
    }

    pub(crate) fn endless(&self, pair: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(TradingPair::from(pair), Script::Endless);
    }

    pub(crate) fn panicking(&self, pair: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(TradingPair::from(pair), Script::Panic);
    }

    /// Hold every dial open, after its connection exists, until a permit
    /// is added to the returned gate.
    pub(crate) fn hold_dials(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn fail_dial(&self, pair: &str) {
        self.failing.lock().unwrap().insert(TradingPair::from(pair));
    }

    pub(crate) fn dialed(&self) -> Vec<Arc<FakeConnection>> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn dial(&self, pair: &TradingPair) -> Result<Arc<dyn Connection>, StreamError> {
        if self.failing.lock().unwrap().contains(pair) {
            return Err(StreamError::Connect {
                pair: pair.clone(),
                reason: "Connection refused".to_string(),
            });
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(pair)
            .unwrap_or(Script::Idle);
        let connection = Arc::new(FakeConnection::new(pair.clone(), script));
        self.dialed.lock().unwrap().push(connection.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // The permit goes straight back so one permit opens every dial.
            drop(gate.acquire().await);
        }
        Ok(connection as Arc<dyn Connection>)
    }
}

/// An event for `pair` carrying a single trade tagged with `tid`.
pub(crate) fn tagged_event(pair: &TradingPair, tid: i64) -> StreamEvent {
    StreamEvent {
        currency_pair: pair.clone(),
        trades: vec![Trade {
            currency_pair: pair.clone(),
            tid,
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn tid(event: &StreamEvent) -> i64 {
    event.trades[0].tid
}
