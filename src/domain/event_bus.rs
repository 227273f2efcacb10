//! In-process publish/subscribe bus with named topics.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel carrying
//! serialized payloads tagged with a topic name. Subscribers pick a
//! topic and only see messages published on it. Producers depend on the
//! [`EventPublisher`] trait so the bus can be swapped for an external
//! broker.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// A payload published on a named topic.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Topic the payload was published on.
    pub topic: Arc<str>,
    /// Serialized payload (JSON for every topic this crate publishes).
    pub payload: Arc<[u8]>,
}

/// Publishing half of an event bus.
#[async_trait]
pub trait EventPublisher: Send + Sync + fmt::Debug {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PublishFailed`] if the bus refuses the
    /// message.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError>;
}

/// Broadcast-backed bus for topic-tagged payloads.
///
/// When the ring buffer is full the oldest messages are dropped for
/// lagging subscribers. Publishing with no subscribers succeeds and
/// delivers to nobody. After [`EventBus::close`] every publish fails and
/// every subscription ends.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusMessage>,
    closed: CancellationToken,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// Publishes a payload, returning the number of receivers reached.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PublishFailed`] once the bus is closed.
    pub fn send(&self, topic: &str, payload: Vec<u8>) -> Result<usize, GatewayError> {
        if self.closed.is_cancelled() {
            return Err(GatewayError::PublishFailed(format!(
                "event bus closed; dropped message on {topic}"
            )));
        }
        let message = BusMessage {
            topic: Arc::from(topic),
            payload: Arc::from(payload),
        };
        Ok(self.sender.send(message).unwrap_or(0))
    }

    /// Subscribes to every future message on `topic`.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: Arc::from(topic),
            receiver: self.sender.subscribe(),
            closed: self.closed.clone(),
        }
    }

    /// Returns the current number of active subscriptions across all topics.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stops accepting publishes and ends every subscription.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Returns `true` once [`EventBus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        let reached = self.send(topic, payload)?;
        tracing::debug!(topic, reached, "event published");
        Ok(())
    }
}

/// Receiving end bound to a single topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Arc<str>,
    receiver: broadcast::Receiver<BusMessage>,
    closed: CancellationToken,
}

impl Subscription {
    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next payload on this topic.
    ///
    /// Messages lost to lag are logged and skipped. Returns `None` once the
    /// bus is closed or every sender is gone.
    pub async fn recv(&mut self) -> Option<Arc<[u8]>> {
        loop {
            let received = tokio::select! {
                () = self.closed.cancelled() => return None,
                received = self.receiver.recv() => received,
            };
            match received {
                Ok(message) if *message.topic == *self.topic => return Some(message.payload),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(topic = %self.topic, lagged = n, "subscriber lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
