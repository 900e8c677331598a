//! Bus Traits
//!
//! The queue fabric the dispatcher runs against. Queues are named, deliveries
//! are opaque byte payloads, and consumers on the same queue compete: every
//! delivery reaches exactly one of them. That competing-consumer property is
//! what lets the ask pool scale by simply registering more workers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Unique identifier for a bridge connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new random connection ID.
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The queue's receiving side is gone; the delivery was dropped.
    #[error("queue '{0}' is closed")]
    QueueClosed(String),
}

/// Errors from the framed socket bridge.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// IO error from the underlying socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded the maximum permitted size.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Claimed or actual payload size.
        size: usize,
        /// Enforced maximum.
        max: usize,
    },

    /// Frame checksum verification failed; the payload is corrupt.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the frame header.
        expected: u32,
        /// Checksum computed over the received payload.
        actual: u32,
    },

    /// The peer is not allowed to connect.
    #[error("peer rejected: {0}")]
    PeerRejected(String),

    /// A bus operation behind the bridge failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// One message taken off a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was published to.
    pub queue: String,
    /// Serialized message body.
    pub payload: Vec<u8>,
}

/// Receiving handle for one queue.
///
/// Clones (and repeated `consumer()` calls for the same queue) share the
/// underlying receiver, so holders compete for deliveries.
#[derive(Clone)]
pub struct BusConsumer {
    queue: String,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

impl BusConsumer {
    /// Wrap a shared receiver for `queue`.
    #[must_use]
    pub fn new(queue: String, rx: Arc<Mutex<mpsc::Receiver<Delivery>>>) -> Self {
        Self { queue, rx }
    }

    /// The queue this consumer is attached to.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Receive the next delivery, blocking until one arrives.
    ///
    /// Returns `None` when the queue is closed and drained.
    pub async fn recv(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }
}

/// The queue fabric seam.
///
/// Implementations must deliver each published message to exactly one
/// consumer of the target queue, in publish order per queue.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` to `queue`, creating the queue if needed.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Attach a competing consumer to `queue`, creating the queue if needed.
    async fn consumer(&self, queue: &str) -> Result<BusConsumer, BusError>;
}
