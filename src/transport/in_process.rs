//! In-Process Bus
//!
//! Channel-backed [`MessageBus`] for embedded deployments and tests. Queues
//! are created on first publish or first consume; each queue is one bounded
//! channel whose receiver is shared by all of its consumers, which yields
//! competing-consumer semantics without any broker.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use super::traits::{BusConsumer, BusError, Delivery, MessageBus};

/// Default per-queue capacity. Publishers are backpressured beyond it.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct QueueHandle {
    tx: mpsc::Sender<Delivery>,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

/// Channel-backed queue fabric.
pub struct InProcessBus {
    queues: DashMap<String, QueueHandle>,
    capacity: usize,
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBus {
    /// Create a bus with the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus with a custom per-queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Handles for `queue`, creating it on first touch.
    ///
    /// The map guard is dropped before returning so no lock is held across
    /// an await point.
    fn queue_handles(&self, queue: &str) -> (mpsc::Sender<Delivery>, Arc<Mutex<mpsc::Receiver<Delivery>>>) {
        let entry = self.queues.entry(queue.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            QueueHandle {
                tx,
                rx: Arc::new(Mutex::new(rx)),
            }
        });
        (entry.tx.clone(), Arc::clone(&entry.rx))
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let (tx, _rx) = self.queue_handles(queue);
        tx.send(Delivery {
            queue: queue.to_string(),
            payload,
        })
        .await
        .map_err(|_| BusError::QueueClosed(queue.to_string()))
    }

    async fn consumer(&self, queue: &str) -> Result<BusConsumer, BusError> {
        let (_tx, rx) = self.queue_handles(queue);
        Ok(BusConsumer::new(queue.to_string(), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_consume() {
        let bus = InProcessBus::new();
        bus.publish("q", b"hello".to_vec()).await.unwrap();

        let consumer = bus.consumer("q").await.unwrap();
        let delivery = consumer.recv().await.unwrap();
        assert_eq!(delivery.queue, "q");
        assert_eq!(delivery.payload, b"hello");
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let bus = InProcessBus::new();
        bus.publish("a", b"for a".to_vec()).await.unwrap();
        bus.publish("b", b"for b".to_vec()).await.unwrap();

        let consumer_b = bus.consumer("b").await.unwrap();
        assert_eq!(consumer_b.recv().await.unwrap().payload, b"for b");
    }

    #[tokio::test]
    async fn test_competing_consumers_split_deliveries() {
        let bus = Arc::new(InProcessBus::new());

        let first = bus.consumer("work").await.unwrap();
        let second = bus.consumer("work").await.unwrap();

        for i in 0u8..10 {
            bus.publish("work", vec![i]).await.unwrap();
        }

        // Both consumers drain the same queue; every delivery arrives
        // exactly once across the pair.
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(first.recv().await.unwrap().payload[0]);
            seen.push(second.recv().await.unwrap().payload[0]);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0u8..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_per_queue_order_is_publish_order() {
        let bus = InProcessBus::new();
        for i in 0u8..4 {
            bus.publish("ordered", vec![i]).await.unwrap();
        }

        let consumer = bus.consumer("ordered").await.unwrap();
        for i in 0u8..4 {
            assert_eq!(consumer.recv().await.unwrap().payload, vec![i]);
        }
    }
}
