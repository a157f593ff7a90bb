//! Per-subscription forwarding task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tinymart_core::{CorrelationKey, SubscriberChannel, TopicRegistry};
use tinymart_proto::{EventSerializer, ServerMessage};

/// Why a forwarding task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardExit {
    /// The session cancelled the subscription.
    Cancelled,
    /// The channel ended because the registry dropped it.
    Ended,
    /// The outbound queue is gone.
    TransportGone,
}

/// Drains one subscriber channel into the connection's outbound queue.
pub(crate) struct Forwarder {
    pub id: String,
    pub key: CorrelationKey,
    pub channel: SubscriberChannel,
    pub registry: Arc<TopicRegistry>,
    pub serializer: Arc<dyn EventSerializer>,
    pub outbound: mpsc::Sender<ServerMessage>,
    pub cancel: CancellationToken,
    /// Cleared when the subscription ends without telling the client.
    pub announce: Arc<AtomicBool>,
    pub complete_timeout: Duration,
}

impl Forwarder {
    pub async fn run(mut self) -> ForwardExit {
        let exit = self.forward().await;

        self.registry.unregister(&self.key, self.channel.id());
        self.channel.close();

        if exit != ForwardExit::TransportGone && self.announce.load(Ordering::Acquire) {
            let complete = ServerMessage::complete(self.id.as_str());
            if tokio::time::timeout(self.complete_timeout, self.outbound.send(complete))
                .await
                .is_err()
            {
                tracing::debug!(id = %self.id, "complete not sent before timeout");
            }
        }

        tracing::debug!(id = %self.id, key = %self.key, ?exit, "subscription finished");
        exit
    }

    async fn forward(&mut self) -> ForwardExit {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ForwardExit::Cancelled,
                event = self.channel.recv() => event,
            };
            let Some(event) = event else {
                return ForwardExit::Ended;
            };

            let message = self.serializer.serialize(&event).into_message(self.id.as_str());
            tracing::trace!(id = %self.id, delivery_id = event.delivery_id, "forwarding event");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ForwardExit::Cancelled,
                sent = self.outbound.send(message) => {
                    if sent.is_err() {
                        return ForwardExit::TransportGone;
                    }
                }
            }
        }
    }
}
