//! C10: on-start dead-letter recovery. Drains the DLQ at
//! prefetch 1, republishing each message to its original routing key with
//! publish-before-ack so a crash mid-recovery leaves the message in the DLQ
//! rather than losing it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use atelier_contracts::MessageType;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::ports::{DeliveredMessage, MessageBus};

const ZERO_READ_WINDOW: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const HARD_CAP: Duration = Duration::from_secs(30 * 60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DlqRecoverySummary {
    pub recovered: u64,
    pub skipped: u64,
}

pub struct DlqRecoveryService<B: MessageBus> {
    bus: Arc<B>,
}

impl<B: MessageBus> DlqRecoveryService<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Runs to one of the three termination conditions: DLQ
    /// count reads zero twice across a 5s window, idle with no message for
    /// 10s, or a 30-minute hard cap.
    pub async fn run(&self) -> Result<DlqRecoverySummary> {
        let start = Instant::now();
        let mut last_activity = Instant::now();
        let mut zero_reads = 0u32;
        let mut summary = DlqRecoverySummary::default();

        loop {
            if start.elapsed() >= HARD_CAP {
                warn!("dlq recovery hit the 30-minute hard cap, stopping with work remaining");
                break;
            }

            let depth = self.bus.dead_letter_depth().await?;
            if depth == 0 {
                zero_reads += 1;
                if zero_reads >= 2 {
                    break;
                }
                tokio::time::sleep(ZERO_READ_WINDOW).await;
                continue;
            }
            zero_reads = 0;

            let Some(delivered) = self.bus.receive_dead_letter().await? else {
                if last_activity.elapsed() >= IDLE_TIMEOUT {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            };
            last_activity = Instant::now();

            if self.recover_one(&delivered).await {
                summary.recovered += 1;
            } else {
                summary.skipped += 1;
            }
        }

        info!(recovered = summary.recovered, skipped = summary.skipped, "dlq recovery finished");
        Ok(summary)
    }

    /// Returns true on a successful republish+ack, false on every
    /// unrecoverable outcome (unmapped type, publish failure).
    async fn recover_one(&self, delivered: &DeliveredMessage) -> bool {
        let message_type = delivered
            .message_type_header
            .as_deref()
            .and_then(MessageType::from_header)
            .or_else(|| {
                delivered
                    .original_routing_key
                    .as_deref()
                    .and_then(MessageType::from_original_routing_key)
            });

        if message_type.is_none() {
            warn!(delivery_tag = delivered.delivery_tag, "dlq message has no resolvable type, keeping for manual review");
            if let Err(err) = self.bus.nack_requeue(delivered.delivery_tag).await {
                error!(delivery_tag = delivered.delivery_tag, error = %err, "failed to nack unmapped dlq message");
            }
            return false;
        }

        match self.bus.publish(&delivered.message).await {
            Ok(()) => {
                if let Err(err) = self.bus.ack(delivered.delivery_tag).await {
                    warn!(delivery_tag = delivered.delivery_tag, error = %err, "republish succeeded but ack failed");
                }
                true
            }
            Err(err) => {
                warn!(delivery_tag = delivered.delivery_tag, error = %err, "republish failed, keeping in dlq");
                if let Err(err) = self.bus.nack_requeue(delivered.delivery_tag).await {
                    error!(delivery_tag = delivered.delivery_tag, error = %err, "failed to nack dlq message after failed republish");
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryMessageBus;
    use atelier_contracts::{BulkOperationMessage, PipelineMessage};

    fn sample() -> PipelineMessage {
        PipelineMessage::BulkOperation(BulkOperationMessage {
            op_type: "reindex".to_string(),
            parameters: serde_json::json!({}),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_a_mapped_message_and_terminates_on_two_zero_reads() {
        let bus = Arc::new(InMemoryMessageBus::new());
        bus.force_dead_letter(sample(), Some("BulkOperation".to_string()));
        let service = DlqRecoveryService::new(bus.clone());

        let summary = service.run().await.unwrap();

        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(bus.dead_letter_depth().await.unwrap(), 0);
        assert_eq!(bus.queue_depth(MessageType::BulkOperation), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_message_is_skipped_not_dropped() {
        let bus = Arc::new(InMemoryMessageBus::new());
        bus.force_dead_letter_malformed(sample(), None, None);
        let service = DlqRecoveryService::new(bus.clone());

        let summary = service.run().await.unwrap();

        assert_eq!(summary.recovered, 0);
        assert_eq!(summary.skipped, 1);
    }
}
