//! Per-connection subscription session.
//!
//! A session multiplexes any number of logical subscriptions over one
//! connection. It reads decoded client messages, translates them into
//! registry operations, and runs one forwarding task per active subscription.
//! All output goes through a bounded outbound queue that the transport
//! drains, so the session never touches the socket itself.

mod forward;

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tinymart_core::{channel, CorrelationKey, SubscriberId, TopicRegistry};
use tinymart_proto::{
    ClientMessage, DeliveryUpdatedSerializer, EventSerializer, ProtocolError, ServerMessage,
    StartPayload,
};

use crate::config::SessionConfig;

pub use forward::ForwardExit;
use forward::Forwarder;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection open with no running subscriptions.
    Idle,
    /// At least one subscription is running.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

/// Whether the read loop should keep going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Summary of a session teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Subscriptions that were still active and got cancelled.
    pub cancelled: usize,
    /// Whether the grace period ran out before every task finished.
    pub timed_out: bool,
}

struct ActiveSubscription {
    key: CorrelationKey,
    subscriber: SubscriberId,
    cancel: CancellationToken,
    announce: Arc<AtomicBool>,
    handle: JoinHandle<ForwardExit>,
}

impl ActiveSubscription {
    /// Cancel without a `complete` message.
    fn retire(&self) {
        self.announce.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

/// State machine for one subscription connection.
pub struct SubscriptionSession {
    registry: Arc<TopicRegistry>,
    serializer: Arc<dyn EventSerializer>,
    config: SessionConfig,
    outbound: mpsc::Sender<ServerMessage>,
    state: SessionState,
    initialised: bool,
    subscriptions: HashMap<String, ActiveSubscription>,
}

impl SubscriptionSession {
    /// Create a session writing to `outbound`.
    pub fn new(
        registry: Arc<TopicRegistry>,
        outbound: mpsc::Sender<ServerMessage>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            serializer: Arc::new(DeliveryUpdatedSerializer::default()),
            config,
            outbound,
            state: SessionState::Idle,
            initialised: false,
            subscriptions: HashMap::new(),
        }
    }

    /// Use a custom payload serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Ids of the subscriptions currently running.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.subscriptions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drive the session from `inbound` frames until the client terminates,
    /// the stream ends, or the transport goes away. Always tears down.
    pub async fn run<S>(mut self, inbound: S) -> TeardownReport
    where
        S: Stream<Item = String>,
    {
        let mut inbound = pin!(inbound);
        let period = self.config.keepalive.filter(|period| !period.is_zero());
        let mut keepalive = period.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let frame = tokio::select! {
                frame = inbound.next() => frame,
                _ = tick(&mut keepalive), if self.initialised => {
                    if self.send(ServerMessage::KeepAlive).await == Flow::Terminate {
                        break;
                    }
                    continue;
                }
            };

            let Some(text) = frame else {
                tracing::debug!("inbound stream ended");
                break;
            };
            if self.handle_text(&text).await == Flow::Terminate {
                break;
            }
        }

        self.close().await
    }

    /// Decode and handle one text frame.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle(message).await,
            Err(err) => self.reject(err).await,
        }
    }

    /// Handle one decoded client message.
    pub async fn handle(&mut self, message: ClientMessage) -> Flow {
        self.reap();

        match message {
            ClientMessage::ConnectionInit => {
                self.initialised = true;
                self.send(ServerMessage::ConnectionAck).await
            }
            ClientMessage::Start { id, payload } => {
                if !self.initialised {
                    return self.reject(ProtocolError::NotInitialised { id }).await;
                }
                self.start(id, &payload).await
            }
            ClientMessage::Stop { id } => {
                self.stop(&id).await;
                Flow::Continue
            }
            ClientMessage::ConnectionTerminate => {
                tracing::debug!("client terminated connection");
                Flow::Terminate
            }
        }
    }

    async fn start(&mut self, id: String, payload: &StartPayload) -> Flow {
        let key = match payload.correlation_value(&self.config.correlation_variable) {
            Ok(value) => CorrelationKey::from_option(value),
            Err(reason) => {
                return self.reject(ProtocolError::InvalidPayload { id, reason }).await;
            }
        };

        if let Some(previous) = self.subscriptions.remove(&id) {
            tracing::debug!(id = %id, "replacing subscription");
            previous.retire();
            self.settle(previous).await;
        }

        let (sender, subscriber_channel) = channel(self.config.subscriber_buffer);
        let subscriber = sender.id();
        self.registry.register(key.clone(), sender);

        let cancel = CancellationToken::new();
        let announce = Arc::new(AtomicBool::new(true));
        let forwarder = Forwarder {
            id: id.clone(),
            key: key.clone(),
            channel: subscriber_channel,
            registry: Arc::clone(&self.registry),
            serializer: Arc::clone(&self.serializer),
            outbound: self.outbound.clone(),
            cancel: cancel.clone(),
            announce: Arc::clone(&announce),
            complete_timeout: self.config.shutdown_grace,
        };
        let handle = tokio::spawn(forwarder.run());

        tracing::debug!(id = %id, key = %key, subscriber = %subscriber, "subscription started");
        self.subscriptions.insert(
            id,
            ActiveSubscription {
                key,
                subscriber,
                cancel,
                announce,
                handle,
            },
        );
        self.state = SessionState::Active;
        Flow::Continue
    }

    async fn stop(&mut self, id: &str) {
        let Some(subscription) = self.subscriptions.remove(id) else {
            tracing::trace!(id, "stop for unknown subscription");
            return;
        };
        subscription.cancel.cancel();
        self.settle(subscription).await;
        self.update_state();
        tracing::debug!(id, "subscription stopped");
    }

    /// Wait for a cancelled subscription's task to finish.
    ///
    /// Its `complete`, if any, is queued before the next inbound message is
    /// handled, so a reused id never receives a stale one.
    async fn settle(&self, mut subscription: ActiveSubscription) {
        let finished =
            tokio::time::timeout(self.config.shutdown_grace, &mut subscription.handle).await;
        if finished.is_err() {
            tracing::warn!(subscriber = %subscription.subscriber, "forwarding task did not stop in time");
            subscription.handle.abort();
        }
        self.registry.unregister(&subscription.key, subscription.subscriber);
    }

    /// Tear the session down.
    ///
    /// Cancels every active subscription once, waits up to the grace period
    /// for forwarding tasks, then unregisters every channel the session
    /// created whether or not its task finished.
    pub async fn close(&mut self) -> TeardownReport {
        if self.state == SessionState::Closed {
            return TeardownReport::default();
        }
        self.state = SessionState::Closing;

        let pending: Vec<_> = self.subscriptions.drain().map(|(_, s)| s).collect();
        let cancelled = pending.len();
        for subscription in &pending {
            subscription.retire();
        }

        let registrations: Vec<_> = pending
            .iter()
            .map(|s| (s.key.clone(), s.subscriber))
            .collect();
        let aborts: Vec<_> = pending.iter().map(|s| s.handle.abort_handle()).collect();
        let handles = pending.into_iter().map(|s| s.handle);

        let timed_out = tokio::time::timeout(self.config.shutdown_grace, join_all(handles))
            .await
            .is_err();
        if timed_out {
            tracing::warn!(cancelled, "forwarding tasks did not finish in time");
            for abort in aborts {
                abort.abort();
            }
        }

        for (key, subscriber) in registrations {
            self.registry.unregister(&key, subscriber);
        }

        self.state = SessionState::Closed;
        TeardownReport {
            cancelled,
            timed_out,
        }
    }

    async fn reject(&mut self, err: ProtocolError) -> Flow {
        tracing::debug!(error = %err, "protocol error");
        self.send(err.to_message()).await
    }

    async fn send(&mut self, message: ServerMessage) -> Flow {
        match self.outbound.send(message).await {
            Ok(()) => Flow::Continue,
            Err(_) => {
                tracing::debug!("outbound queue closed");
                Flow::Terminate
            }
        }
    }

    /// Forget tasks that have already finished.
    fn reap(&mut self) {
        self.subscriptions.retain(|_, s| !s.handle.is_finished());
        self.update_state();
    }

    fn update_state(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Active) {
            self.state = if self.subscriptions.is_empty() {
                SessionState::Idle
            } else {
                SessionState::Active
            };
        }
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        for subscription in self.subscriptions.values() {
            subscription.retire();
            self.registry.unregister(&subscription.key, subscription.subscriber);
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
