//! A DLQ holding a mix of mapped and unmapped messages
//! recovers the mapped ones and leaves the rest for manual review.

use std::sync::Arc;

use atelier_contracts::{MessageType, PipelineMessage, ThumbnailGenerationMessage};
use atelier_contracts::{CollectionId, ImageId, JobId};
use atelier_core::bus::InMemoryMessageBus;
use atelier_core::consumers::dlq_recovery::DlqRecoveryService;
use atelier_core::ports::MessageBus;

fn thumbnail_message() -> PipelineMessage {
    PipelineMessage::ThumbnailGeneration(ThumbnailGenerationMessage {
        collection_id: CollectionId::new(),
        image_id: ImageId::new(),
        image_path: "/a.jpg".to_string(),
        image_filename: "a.jpg".to_string(),
        width: 300,
        height: 300,
        job_id: JobId::new(),
        scan_job_id: JobId::new(),
    })
}

#[tokio::test(start_paused = true)]
async fn mixed_dlq_recovers_mapped_and_skips_unmapped() {
    let bus = Arc::new(InMemoryMessageBus::new());
    for _ in 0..99 {
        bus.force_dead_letter(thumbnail_message(), Some("ThumbnailGeneration".to_string()));
    }
    for _ in 0..1 {
        bus.force_dead_letter_malformed(thumbnail_message(), None, None);
    }

    let service = DlqRecoveryService::new(bus.clone());
    let summary = service.run().await.unwrap();

    assert_eq!(summary.recovered, 99);
    assert_eq!(summary.skipped, 1);
    assert_eq!(bus.queue_depth(MessageType::ThumbnailGeneration), 99);
    // The unmapped message is nacked back onto the DLQ, not dropped.
    assert_eq!(bus.dead_letter_depth().await.unwrap(), 1);
}
