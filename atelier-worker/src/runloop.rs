//! Per-role receive loops: each consumer drains one queue at its configured prefetch and
//! acks/nacks based on its handler's result.

use std::sync::Arc;
use std::time::Duration;

use atelier_contracts::{MessageType, PipelineMessage};
use atelier_core::consumers::batch_generator::BatchGenerator;
use atelier_core::consumers::collection_scan::CollectionScanConsumer;
use atelier_core::consumers::image_processing::ImageProcessingConsumer;
use atelier_core::consumers::job_monitor::{JobMonitor, SWEEP_INTERVAL};
use atelier_core::consumers::library_scan::LibraryScanConsumer;
use atelier_core::ports::{ArtifactStore, MessageBus, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const IDLE_BACKOFF: Duration = Duration::from_millis(200);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

async fn next_batch<B: MessageBus>(
    bus: &B,
    queue: MessageType,
    prefetch: u16,
    role: &'static str,
) -> Vec<atelier_core::ports::DeliveredMessage> {
    match bus.receive(queue, prefetch).await {
        Ok(messages) => messages,
        Err(err) => {
            warn!(role, error = %err, "receive failed");
            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            Vec::new()
        }
    }
}

/// Drives the library-scan queue to completion against the shutdown token.
pub async fn run_library_scan<R, B>(
    consumer: Arc<LibraryScanConsumer<R, B>>,
    bus: Arc<B>,
    prefetch: u16,
    shutdown: CancellationToken,
) where
    R: Repository,
    B: MessageBus,
{
    loop {
        let delivered = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = next_batch(&*bus, MessageType::LibraryScan, prefetch, "library-scan") => batch,
        };
        if delivered.is_empty() {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }
        for item in delivered {
            let PipelineMessage::LibraryScan(message) = item.message else {
                warn!("library-scan queue delivered a message of the wrong type");
                let _ = bus.nack_requeue(item.delivery_tag).await;
                continue;
            };
            acknowledge(&*bus, item.delivery_tag, "library-scan", consumer.handle(&message).await).await;
        }
    }
    info!("library-scan loop stopped");
}

pub async fn run_collection_scan<R, B>(
    consumer: Arc<CollectionScanConsumer<R, B>>,
    bus: Arc<B>,
    prefetch: u16,
    shutdown: CancellationToken,
) where
    R: Repository,
    B: MessageBus,
{
    loop {
        let delivered = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = next_batch(&*bus, MessageType::CollectionScan, prefetch, "collection-scan") => batch,
        };
        if delivered.is_empty() {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }
        for item in delivered {
            let PipelineMessage::CollectionScan(message) = item.message else {
                warn!("collection-scan queue delivered a message of the wrong type");
                let _ = bus.nack_requeue(item.delivery_tag).await;
                continue;
            };
            acknowledge(&*bus, item.delivery_tag, "collection-scan", consumer.handle(&message).await).await;
        }
    }
    info!("collection-scan loop stopped");
}

pub async fn run_image_processing<R, B>(
    consumer: Arc<ImageProcessingConsumer<R, B>>,
    bus: Arc<B>,
    prefetch: u16,
    shutdown: CancellationToken,
) where
    R: Repository,
    B: MessageBus,
{
    loop {
        let delivered = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = next_batch(&*bus, MessageType::ImageProcessing, prefetch, "image-processing") => batch,
        };
        if delivered.is_empty() {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }
        for item in delivered {
            let PipelineMessage::ImageProcessing(message) = item.message else {
                warn!("image-processing queue delivered a message of the wrong type");
                let _ = bus.nack_requeue(item.delivery_tag).await;
                continue;
            };
            acknowledge(&*bus, item.delivery_tag, "image-processing", consumer.handle(&message).await).await;
        }
    }
    info!("image-processing loop stopped");
}

async fn acknowledge<B: MessageBus>(bus: &B, tag: u64, role: &'static str, result: atelier_core::error::Result<()>) {
    match result {
        Ok(()) => {
            if let Err(err) = bus.ack(tag).await {
                warn!(role, delivery_tag = tag, error = %err, "ack failed");
            }
        }
        Err(err) => {
            warn!(role, delivery_tag = tag, error = %err, "handler failed, nacking for redelivery");
            if let Err(err) = bus.nack_requeue(tag).await {
                error!(role, delivery_tag = tag, error = %err, "nack failed");
            }
        }
    }
}

/// Drains both the thumbnail and cache queues into the batch generator's
/// bucketing map, and runs the timeout-triggered flush sweep alongside it.
/// `BatchGenerator::accept_thumbnail`/`accept_cache` own the full ack/nack
/// lifecycle internally via `flush`, so this loop never touches the bus's
/// ack/nack itself. On shutdown, flushes every remaining bucket before
/// returning so nothing is left pending past the grace period.
pub async fn run_batch_generator<R, B, A>(
    generator: Arc<BatchGenerator<R, B, A>>,
    bus: Arc<B>,
    thumbnail_prefetch: u16,
    cache_prefetch: u16,
    shutdown: CancellationToken,
) where
    R: Repository + 'static,
    B: MessageBus + 'static,
    A: ArtifactStore + 'static,
{
    let sweep_generator = generator.clone();
    let sweep_shutdown = shutdown.clone();
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = sweep_shutdown.cancelled() => break,
                _ = ticker.tick() => sweep_generator.flush_timed_out().await,
            }
        }
    });

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let thumbnails = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = next_batch(&*bus, MessageType::ThumbnailGeneration, thumbnail_prefetch, "batch-generator") => batch,
        };
        let thumbnail_count = thumbnails.len();
        for delivered in thumbnails {
            if let PipelineMessage::ThumbnailGeneration(message) = delivered.message {
                if let Err(err) = generator.accept_thumbnail(delivered.delivery_tag, message).await {
                    error!(error = %err, "accept_thumbnail failed");
                }
            }
        }

        let caches = next_batch(&*bus, MessageType::CacheGeneration, cache_prefetch, "batch-generator").await;
        let cache_count = caches.len();
        for delivered in caches {
            if let PipelineMessage::CacheGeneration(message) = delivered.message {
                if let Err(err) = generator.accept_cache(delivered.delivery_tag, message).await {
                    error!(error = %err, "accept_cache failed");
                }
            }
        }

        if thumbnail_count == 0 && cache_count == 0 {
            tokio::time::sleep(IDLE_BACKOFF).await;
        }
    }

    sweep_task.abort();
    generator.flush_all().await;
    info!("batch generator loop stopped, buckets flushed");
}

/// Sweeps in-progress jobs every [`SWEEP_INTERVAL`] until shutdown.
pub async fn run_job_monitor<R: Repository + 'static>(monitor: Arc<JobMonitor<R>>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = monitor.sweep_once().await {
                    warn!(error = %err, "job monitor sweep failed");
                }
            }
        }
    }
    info!("job monitor loop stopped");
}
