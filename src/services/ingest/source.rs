//! Inbound message source abstraction
//!
//! The broker itself is an external collaborator; workers only need a stream
//! of deliveries with explicit acknowledgment. A delivery that is dropped
//! without being resolved counts as unacknowledged, which under at-least-once
//! delivery means the broker redelivers it.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

/// How a worker resolved a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Processing committed; the broker may forget the message
    Ack,

    /// Terminal failure (malformed, policy-rejected); dead-letter it
    Reject,
}

/// One inbound message with its routing key
#[derive(Debug)]
pub struct Delivery {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
    resolution: Option<oneshot::Sender<Resolution>>,
}

impl Delivery {
    /// Create a delivery plus the receiver the producer watches for its fate.
    /// Dropping the delivery unresolved closes the channel, which the
    /// producer must treat as "redeliver".
    pub fn new(
        routing_key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> (Self, oneshot::Receiver<Resolution>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                routing_key: routing_key.into(),
                payload: payload.into(),
                received_at: Utc::now(),
                resolution: Some(tx),
            },
            rx,
        )
    }

    /// Acknowledge: only called strictly after the transaction committed
    pub fn ack(mut self) {
        if let Some(tx) = self.resolution.take() {
            let _ = tx.send(Resolution::Ack);
        }
    }

    /// Dead-letter: redelivery cannot fix this message
    pub fn reject(mut self) {
        if let Some(tx) = self.resolution.take() {
            let _ = tx.send(Resolution::Reject);
        }
    }
}

/// Source of inbound deliveries shared by the competing workers
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    /// Next delivery, or `None` once the source is closed and drained
    async fn recv(&self) -> Option<Delivery>;
}

/// In-memory source backed by a tokio channel. Stands in for the broker in
/// tests and the replay tool; each delivery still goes to exactly one worker.
pub struct ChannelSource {
    rx: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Delivery>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait::async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }
}
