use async_trait::async_trait;
use atelier_contracts::{MessageType, PipelineMessage};

use crate::error::Result;

/// One delivery from the bus, carrying just enough to drive the manual
/// ack/nack discipline the DLQ recovery and batch consumers both rely on.
#[derive(Clone, Debug)]
pub struct DeliveredMessage {
    pub delivery_tag: u64,
    pub message: PipelineMessage,
    /// Present when the `MessageType` header itself was unreadable and the
    /// consumer fell back to `x-death[0].routing-keys[0]`.
    pub message_type_header: Option<String>,
    pub original_routing_key: Option<String>,
}

/// Durable, topic-routed queues with per-queue prefetch, manual ack, and
/// dead-letter routing (C1). Implementations own their own connection
/// lifecycle; this trait only exposes the operations the consumers need.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: &PipelineMessage) -> Result<()>;

    /// Receive up to `max` messages from the named queue, never exceeding
    /// the caller's declared prefetch.
    async fn receive(&self, queue: MessageType, max: u16) -> Result<Vec<DeliveredMessage>>;

    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    async fn nack_requeue(&self, delivery_tag: u64) -> Result<()>;

    /// Drain one message from the dead-letter queue, if any, without
    /// decoding it as a [`PipelineMessage`] (its header may be missing or
    /// its body unparseable) — used exclusively by DLQ recovery.
    async fn receive_dead_letter(&self) -> Result<Option<DeliveredMessage>>;

    async fn dead_letter_depth(&self) -> Result<u64>;
}
