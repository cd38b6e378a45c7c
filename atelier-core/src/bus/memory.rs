use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use atelier_contracts::{MessageType, PipelineMessage};
use parking_lot::Mutex;

use crate::error::{AtelierError, Result};
use crate::ports::{DeliveredMessage, MessageBus};

struct Queues {
    ready: HashMap<MessageType, VecDeque<PipelineMessage>>,
    in_flight: HashMap<u64, PipelineMessage>,
    dead_letter: VecDeque<DeliveredMessage>,
    /// Deliveries handed out by [`receive_dead_letter`], tracked separately
    /// from `in_flight` so a nack on one of these returns the message to
    /// `dead_letter` (manual review) rather than the normal `ready` queue.
    dead_letter_in_flight: HashMap<u64, DeliveredMessage>,
}

/// Single-process message bus used where no durable broker is configured.
///
/// This stands in for the durable topic exchange (C1) in deployments that
/// run the whole pipeline in one process; it has no persistence across
/// restarts, so an in-flight message is lost on crash rather than
/// redelivered (the durable adapter contract assumes redelivery — callers
/// relying on at-least-once semantics across a process restart need a real
/// broker adapter). Messages only land in `dead_letter` via
/// [`InMemoryMessageBus::force_dead_letter`], since this bus has no TTL or
/// retry-count expiry of its own. A delivery handed out by
/// `receive_dead_letter` nacks back onto `dead_letter`, not `ready`, so DLQ
/// recovery's unmapped-message path doesn't silently lose the message.
pub struct InMemoryMessageBus {
    queues: Mutex<Queues>,
    next_tag: AtomicU64,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues {
                ready: HashMap::new(),
                in_flight: HashMap::new(),
                dead_letter: VecDeque::new(),
                dead_letter_in_flight: HashMap::new(),
            }),
            next_tag: AtomicU64::new(1),
        }
    }

    /// Move a message straight to the dead-letter queue, bypassing normal
    /// delivery. Used by tests and by operator tooling that wants to force
    /// a message through DLQ recovery without waiting on TTL expiry.
    pub fn force_dead_letter(&self, message: PipelineMessage, message_type_header: Option<String>) {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let original_routing_key = Some(message.message_type().routing_key().to_string());
        self.queues.lock().dead_letter.push_back(DeliveredMessage {
            delivery_tag: tag,
            message,
            message_type_header,
            original_routing_key,
        });
    }

    /// Push a dead-letter entry with caller-chosen header/routing-key values
    /// instead of ones derived from the message's own type, so tests can
    /// simulate the fully-opaque case DLQ recovery must still handle: no
    /// `MessageType` header and no recoverable `x-death` routing key.
    pub fn force_dead_letter_malformed(
        &self,
        message: PipelineMessage,
        message_type_header: Option<String>,
        original_routing_key: Option<String>,
    ) {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        self.queues.lock().dead_letter.push_back(DeliveredMessage {
            delivery_tag: tag,
            message,
            message_type_header,
            original_routing_key,
        });
    }

    pub fn queue_depth(&self, queue: MessageType) -> usize {
        self.queues
            .lock()
            .ready
            .get(&queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: &PipelineMessage) -> Result<()> {
        let queue = message.message_type();
        self.queues
            .lock()
            .ready
            .entry(queue)
            .or_default()
            .push_back(message.clone());
        Ok(())
    }

    async fn receive(&self, queue: MessageType, max: u16) -> Result<Vec<DeliveredMessage>> {
        let mut queues = self.queues.lock();
        let mut out = Vec::new();
        for _ in 0..max {
            let Some(message) = queues.ready.get_mut(&queue).and_then(VecDeque::pop_front) else {
                break;
            };
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            queues.in_flight.insert(tag, message.clone());
            out.push(DeliveredMessage {
                delivery_tag: tag,
                message,
                message_type_header: Some(queue.header_value().to_string()),
                original_routing_key: Some(queue.routing_key().to_string()),
            });
        }
        Ok(out)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        let mut queues = self.queues.lock();
        if queues.in_flight.remove(&delivery_tag).is_some() {
            return Ok(());
        }
        queues.dead_letter_in_flight.remove(&delivery_tag);
        Ok(())
    }

    async fn nack_requeue(&self, delivery_tag: u64) -> Result<()> {
        let mut queues = self.queues.lock();
        if let Some(message) = queues.in_flight.remove(&delivery_tag) {
            let queue = message.message_type();
            queues.ready.entry(queue).or_default().push_back(message);
            return Ok(());
        }
        if let Some(delivered) = queues.dead_letter_in_flight.remove(&delivery_tag) {
            queues.dead_letter.push_back(delivered);
            return Ok(());
        }
        Err(AtelierError::NotFound(format!(
            "no in-flight message for delivery tag {delivery_tag}"
        )))
    }

    async fn receive_dead_letter(&self) -> Result<Option<DeliveredMessage>> {
        let mut queues = self.queues.lock();
        let Some(delivered) = queues.dead_letter.pop_front() else {
            return Ok(None);
        };
        queues.dead_letter_in_flight.insert(delivered.delivery_tag, delivered.clone());
        Ok(Some(delivered))
    }

    async fn dead_letter_depth(&self) -> Result<u64> {
        Ok(self.queues.lock().dead_letter.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_contracts::{BulkOperationMessage, MessageType};

    fn sample() -> PipelineMessage {
        PipelineMessage::BulkOperation(BulkOperationMessage {
            op_type: "reindex".to_string(),
            parameters: serde_json::json!({}),
        })
    }

    #[tokio::test]
    async fn publish_then_receive_round_trips() {
        let bus = InMemoryMessageBus::new();
        bus.publish(&sample()).await.unwrap();
        let delivered = bus.receive(MessageType::BulkOperation, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn nacked_message_is_redelivered() {
        let bus = InMemoryMessageBus::new();
        bus.publish(&sample()).await.unwrap();
        let delivered = bus.receive(MessageType::BulkOperation, 10).await.unwrap();
        bus.nack_requeue(delivered[0].delivery_tag).await.unwrap();
        let redelivered = bus.receive(MessageType::BulkOperation, 10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
    }

    #[tokio::test]
    async fn acked_message_is_not_redelivered() {
        let bus = InMemoryMessageBus::new();
        bus.publish(&sample()).await.unwrap();
        let delivered = bus.receive(MessageType::BulkOperation, 10).await.unwrap();
        bus.ack(delivered[0].delivery_tag).await.unwrap();
        let redelivered = bus.receive(MessageType::BulkOperation, 10).await.unwrap();
        assert!(redelivered.is_empty());
    }

    #[tokio::test]
    async fn forced_dead_letter_is_drained_in_order() {
        let bus = InMemoryMessageBus::new();
        bus.force_dead_letter(sample(), Some("BulkOperation".to_string()));
        assert_eq!(bus.dead_letter_depth().await.unwrap(), 1);
        let drained = bus.receive_dead_letter().await.unwrap();
        assert!(drained.is_some());
        assert_eq!(bus.dead_letter_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nacking_a_dead_letter_delivery_returns_it_to_the_dlq_not_ready() {
        let bus = InMemoryMessageBus::new();
        bus.force_dead_letter(sample(), None);
        let delivered = bus.receive_dead_letter().await.unwrap().unwrap();
        assert_eq!(bus.dead_letter_depth().await.unwrap(), 0);

        bus.nack_requeue(delivered.delivery_tag).await.unwrap();

        assert_eq!(bus.dead_letter_depth().await.unwrap(), 1);
        assert_eq!(bus.queue_depth(MessageType::BulkOperation), 0);
    }
}
