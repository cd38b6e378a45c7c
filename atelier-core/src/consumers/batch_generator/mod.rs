//! C8: the batch thumbnail/cache generator, the hardest
//! component in the pipeline. Groups incoming messages by collection,
//! processes a bounded batch in memory, writes artifacts in one sequential
//! pass, and commits metadata atomically per collection.

pub mod batcher;
pub mod commit;
pub mod memory_pool;
pub mod pipeline;

use std::sync::Arc;

use atelier_config::PipelineConfig;
use atelier_contracts::{CacheGenerationMessage, CollectionId, JobId, ThumbnailGenerationMessage};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::domain::{CacheEntry, ImageFormat, ThumbnailEntry};
use crate::error::{ErrorKind, Result};
use crate::job::JobStatus;
use crate::ports::{ArtifactStore, MessageBus, Repository};

use batcher::{BatchItem, Batcher};
use commit::{CacheWrite, ThumbnailWrite};
use memory_pool::MemoryPool;

/// Owns the bucketing map, memory pool, and concurrency gates for one
/// generator instance. One instance serves both the thumbnail and cache
/// queues, since the idempotence and commit machinery is identical; the two
/// only differ in render settings and entry type.
pub struct BatchGenerator<R: Repository, B: MessageBus, A: ArtifactStore> {
    repository: Arc<R>,
    bus: Arc<B>,
    artifact_store: Arc<A>,
    batcher: Arc<Batcher>,
    memory_pool: Arc<MemoryPool>,
    flush_gate: Arc<Semaphore>,
    processing_gate: Arc<Semaphore>,
    max_image_size_bytes: u64,
    max_zip_entry_size_bytes: u64,
}

impl<R: Repository + 'static, B: MessageBus + 'static, A: ArtifactStore + 'static> BatchGenerator<R, B, A> {
    pub fn new(repository: Arc<R>, bus: Arc<B>, artifact_store: Arc<A>, config: &PipelineConfig) -> Self {
        Self {
            repository,
            bus,
            artifact_store,
            batcher: Arc::new(Batcher::new(config.batch.max_batch_size, config.batch.batch_timeout())),
            memory_pool: Arc::new(MemoryPool::new(
                config.memory.max_memory_usage_bytes(),
                config.memory.memory_pool_size,
                config.memory.default_buffer_size_bytes,
            )),
            flush_gate: Arc::new(Semaphore::new(config.batch.max_concurrent_batches)),
            processing_gate: Arc::new(Semaphore::new(config.memory.max_concurrent_processing)),
            max_image_size_bytes: config.queue.max_image_size_bytes,
            max_zip_entry_size_bytes: config.queue.max_zip_entry_size_bytes,
        }
    }

    /// Buckets one thumbnail-generation delivery; flushes the bucket
    /// immediately if this push reached `MaxBatchSize`.
    pub async fn accept_thumbnail(&self, delivery_tag: u64, message: ThumbnailGenerationMessage) -> Result<()> {
        self.ensure_job_running(message.job_id).await;
        let collection_id = message.collection_id;
        if let Some(items) = self.batcher.add(
            collection_id,
            BatchItem::Thumbnail { delivery_tag, message },
        ) {
            self.flush(collection_id, items).await;
        }
        Ok(())
    }

    pub async fn accept_cache(&self, delivery_tag: u64, message: CacheGenerationMessage) -> Result<()> {
        self.ensure_job_running(message.job_id).await;
        let collection_id = message.collection_id;
        if let Some(items) = self.batcher.add(collection_id, BatchItem::Cache { delivery_tag, message }) {
            self.flush(collection_id, items).await;
        }
        Ok(())
    }

    /// Called from a periodic sweep task to flush buckets whose oldest
    /// message has aged past `BatchTimeoutSeconds`, independent of size.
    pub async fn flush_timed_out(&self) {
        for (collection_id, items) in self.batcher.drain_timed_out() {
            self.flush(collection_id, items).await;
        }
    }

    /// Drains every bucket unconditionally; called on graceful shutdown so
    /// nothing is left un-acked past the grace period.
    pub async fn flush_all(&self) {
        for (collection_id, items) in self.batcher.drain_all() {
            self.flush(collection_id, items).await;
        }
    }

    /// Sets the job to Running on first activity. Best-effort: a failure here never blocks processing.
    async fn ensure_job_running(&self, job_id: JobId) {
        if let Ok(Some(job)) = self.repository.get_job(job_id).await {
            if matches!(job.status, JobStatus::Pending) {
                if let Err(err) = self.repository.set_job_status(job_id, JobStatus::Running).await {
                    warn!(job_id = %job_id, error = %err, "failed to set job running on first activity");
                }
            }
        }
    }

    async fn flush(&self, collection_id: CollectionId, items: Vec<BatchItem>) {
        let _permit = self
            .flush_gate
            .acquire()
            .await
            .expect("semaphore is never closed");

        let collection = match self.repository.get_collection(collection_id).await {
            Ok(Some(collection)) => collection,
            Ok(None) => {
                error!(collection_id = %collection_id, "flush aborted: collection no longer exists");
                for item in items {
                    self.nack(&item).await;
                }
                return;
            }
            Err(err) => {
                error!(collection_id = %collection_id, error = %err, "flush aborted: failed to load collection");
                for item in items {
                    self.nack(&item).await;
                }
                return;
            }
        };

        let mut thumbnail_writes = Vec::new();
        let mut thumbnail_precomputed = Vec::new();
        let mut cache_writes = Vec::new();
        let mut cache_precomputed = Vec::new();
        let mut to_ack = Vec::new();
        let mut to_nack = Vec::new();
        let mut scan_job_id: Option<JobId> = None;
        let mut already_present_thumbnail = 0u64;
        let mut already_present_cache = 0u64;
        let mut job_completed = 0u64;
        let mut job_failed = 0u64;
        let mut job_skipped = 0u64;

        for item in items {
            match &item {
                BatchItem::Thumbnail { message, .. } => scan_job_id.get_or_insert(message.scan_job_id),
                BatchItem::Cache { message, .. } => scan_job_id.get_or_insert(message.scan_job_id),
            };

            let _permit = self
                .processing_gate
                .acquire()
                .await
                .expect("semaphore is never closed");

            match &item {
                BatchItem::Thumbnail { message, .. } => {
                    match self.process_thumbnail(&collection, message).await {
                        Ok(Outcome::Generated { bytes, width, height, quality }) => {
                            thumbnail_writes.push(ThumbnailWrite {
                                image_id: message.image_id,
                                bytes,
                                width,
                                height,
                                format: ImageFormat::Jpeg,
                                quality,
                            });
                            job_completed += 1;
                            to_ack.push(item.clone());
                        }
                        Ok(Outcome::Reregistered { path, size_bytes }) => {
                            thumbnail_precomputed.push(ThumbnailEntry {
                                image_id: message.image_id,
                                path,
                                width: message.width,
                                height: message.height,
                                format: ImageFormat::Jpeg,
                                quality: 85,
                                size_bytes,
                            });
                            job_completed += 1;
                            to_ack.push(item.clone());
                        }
                        Ok(Outcome::AlreadyPresent) => {
                            already_present_thumbnail += 1;
                            job_completed += 1;
                            to_ack.push(item.clone());
                        }
                        Ok(Outcome::SkippedSentinel) => {
                            job_skipped += 1;
                            to_ack.push(item.clone());
                        }
                        Ok(Outcome::Sentinel { error_kind }) => {
                            thumbnail_precomputed.push(ThumbnailEntry::sentinel(
                                message.image_id,
                                message.width,
                                message.height,
                            ));
                            self.record_failure(message.scan_job_id, error_kind).await;
                            job_failed += 1;
                            to_ack.push(item.clone());
                        }
                        Err(err) => {
                            warn!(image_id = %message.image_id, error = %err, "thumbnail generation failed transiently");
                            to_nack.push(item.clone());
                        }
                    }
                }
                BatchItem::Cache { message, .. } => match self.process_cache(&collection, message).await {
                    Ok(Outcome::Generated { bytes, quality, .. }) => {
                        cache_writes.push(CacheWrite {
                            image_id: message.image_id,
                            bytes,
                            format: ImageFormat::Jpeg,
                            quality,
                        });
                        job_completed += 1;
                        to_ack.push(item.clone());
                    }
                    Ok(Outcome::Reregistered { path, size_bytes }) => {
                        cache_precomputed.push(CacheEntry {
                            image_id: message.image_id,
                            path,
                            format: ImageFormat::Jpeg,
                            quality: message.quality,
                            size_bytes,
                        });
                        job_completed += 1;
                        to_ack.push(item.clone());
                    }
                    Ok(Outcome::AlreadyPresent) => {
                        already_present_cache += 1;
                        job_completed += 1;
                        to_ack.push(item.clone());
                    }
                    Ok(Outcome::SkippedSentinel) => {
                        job_skipped += 1;
                        to_ack.push(item.clone());
                    }
                    Ok(Outcome::Sentinel { error_kind }) => {
                        cache_precomputed.push(CacheEntry::sentinel(message.image_id));
                        self.record_failure(message.scan_job_id, error_kind).await;
                        job_failed += 1;
                        to_ack.push(item.clone());
                    }
                    Err(err) => {
                        warn!(image_id = %message.image_id, error = %err, "cache generation failed transiently");
                        to_nack.push(item.clone());
                    }
                },
            }
        }

        if let Some(scan_job_id) = scan_job_id {
            // Already-complete entries were neither written nor re-registered,
            // but they still count toward the stage total.
            if already_present_thumbnail > 0 {
                if let Err(err) = self
                    .repository
                    .increment_stage_progress(scan_job_id, "thumbnail", already_present_thumbnail)
                    .await
                {
                    error!(error = %err, "failed to credit already-present thumbnails to stage progress");
                }
            }
            if already_present_cache > 0 {
                if let Err(err) = self
                    .repository
                    .increment_stage_progress(scan_job_id, "cache", already_present_cache)
                    .await
                {
                    error!(error = %err, "failed to credit already-present cache entries to stage progress");
                }
            }

            if job_completed > 0 {
                if let Err(err) = self.repository.increment_completed(scan_job_id, job_completed).await {
                    error!(error = %err, "failed to increment job-level completed counter");
                }
            }
            if job_failed > 0 {
                if let Err(err) = self.repository.increment_failed(scan_job_id, job_failed).await {
                    error!(error = %err, "failed to increment job-level failed counter");
                }
            }
            if job_skipped > 0 {
                if let Err(err) = self.repository.increment_skipped(scan_job_id, job_skipped).await {
                    error!(error = %err, "failed to increment job-level skipped counter");
                }
            }

            let commit_result = commit::commit_thumbnails(
                self.artifact_store.as_ref(),
                self.repository.as_ref(),
                collection_id,
                scan_job_id,
                thumbnail_writes,
                thumbnail_precomputed,
            )
            .await;
            if let Err(err) = commit_result {
                error!(collection_id = %collection_id, error = %err, "thumbnail commit failed, NACKing batch for redelivery");
                move_matching(&mut to_ack, &mut to_nack, |item| matches!(item, BatchItem::Thumbnail { .. }));
            }

            let commit_result = commit::commit_cache_entries(
                self.artifact_store.as_ref(),
                self.repository.as_ref(),
                collection_id,
                scan_job_id,
                cache_writes,
                cache_precomputed,
            )
            .await;
            if let Err(err) = commit_result {
                error!(collection_id = %collection_id, error = %err, "cache commit failed, NACKing batch for redelivery");
                move_matching(&mut to_ack, &mut to_nack, |item| matches!(item, BatchItem::Cache { .. }));
            }
        }

        for item in &to_ack {
            self.ack(item).await;
        }
        for item in &to_nack {
            self.nack(item).await;
        }
    }

    async fn record_failure(&self, job_id: JobId, error_kind: ErrorKind) {
        if let Err(err) = self.repository.track_error(job_id, error_kind).await {
            warn!(job_id = %job_id, error = %err, "failed to record tracked error");
        }
    }

    async fn process_thumbnail(
        &self,
        collection: &crate::domain::Collection,
        message: &ThumbnailGenerationMessage,
    ) -> Result<Outcome> {
        if let Some(existing) = collection.thumbnail(message.image_id, message.width, message.height) {
            if existing.is_sentinel() {
                return Ok(Outcome::SkippedSentinel);
            }
            if self.artifact_store.exists(&existing.path).await.unwrap_or(false) {
                return Ok(Outcome::AlreadyPresent);
            }
        }

        let expected_path =
            self.artifact_store
                .expected_path(message.collection_id, message.image_id, crate::ports::ArtifactKind::Thumbnail, "jpg");
        if self.artifact_store.exists(&expected_path).await.unwrap_or(false) {
            let size_bytes = std::fs::metadata(&expected_path).map(|meta| meta.len()).unwrap_or(0);
            return Ok(Outcome::Reregistered { path: expected_path, size_bytes });
        }

        let image = match collection.image(message.image_id) {
            Some(image) => image,
            None => return Ok(Outcome::Sentinel { error_kind: ErrorKind::Other }),
        };

        let max_size = if atelier_contracts::archive_path::is_archive_path(&image.full_path) {
            self.max_zip_entry_size_bytes
        } else {
            self.max_image_size_bytes
        };
        if let Err(err) = pipeline::preflight_check(image.size_bytes, max_size) {
            return Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) });
        }

        let mut reservation = self.memory_pool.acquire(image.size_bytes).await;
        if let Err(err) = pipeline::read_source_bytes_into(&image.full_path, reservation.buffer_mut()) {
            return Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) });
        }
        match pipeline::render_thumbnail(reservation.buffer(), message.width, message.height) {
            Ok(rendered) => Ok(Outcome::Generated {
                bytes: rendered.bytes,
                width: rendered.width,
                height: rendered.height,
                quality: rendered.quality,
            }),
            Err(err) => Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) }),
        }
    }

    async fn process_cache(
        &self,
        collection: &crate::domain::Collection,
        message: &CacheGenerationMessage,
    ) -> Result<Outcome> {
        if !message.force_regenerate {
            if let Some(existing) = collection.cache_entry(message.image_id) {
                if existing.is_sentinel() {
                    return Ok(Outcome::SkippedSentinel);
                }
                if self.artifact_store.exists(&existing.path).await.unwrap_or(false) {
                    return Ok(Outcome::AlreadyPresent);
                }
            }
        }

        let expected_path =
            self.artifact_store
                .expected_path(message.collection_id, message.image_id, crate::ports::ArtifactKind::Cache, "jpg");
        if !message.force_regenerate && self.artifact_store.exists(&expected_path).await.unwrap_or(false) {
            let size_bytes = std::fs::metadata(&expected_path).map(|meta| meta.len()).unwrap_or(0);
            return Ok(Outcome::Reregistered { path: expected_path, size_bytes });
        }

        let image = match collection.image(message.image_id) {
            Some(image) => image,
            None => return Ok(Outcome::Sentinel { error_kind: ErrorKind::Other }),
        };

        let max_size = if atelier_contracts::archive_path::is_archive_path(&image.full_path) {
            self.max_zip_entry_size_bytes
        } else {
            self.max_image_size_bytes
        };
        if let Err(err) = pipeline::preflight_check(image.size_bytes, max_size) {
            return Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) });
        }

        let mut reservation = self.memory_pool.acquire(image.size_bytes).await;
        if let Err(err) = pipeline::read_source_bytes_into(&image.full_path, reservation.buffer_mut()) {
            return Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) });
        }
        match pipeline::render_cache(reservation.buffer(), message.width, message.height, message.quality) {
            Ok(rendered) => Ok(Outcome::Generated {
                bytes: rendered.bytes,
                width: rendered.width,
                height: rendered.height,
                quality: rendered.quality,
            }),
            Err(err) => Ok(Outcome::Sentinel { error_kind: ErrorKind::from(&err) }),
        }
    }

    async fn ack(&self, item: &BatchItem) {
        let tag = match item {
            BatchItem::Thumbnail { delivery_tag, .. } => *delivery_tag,
            BatchItem::Cache { delivery_tag, .. } => *delivery_tag,
        };
        if let Err(err) = self.bus.ack(tag).await {
            warn!(delivery_tag = tag, error = %err, "ack failed");
        }
    }

    async fn nack(&self, item: &BatchItem) {
        let tag = match item {
            BatchItem::Thumbnail { delivery_tag, .. } => *delivery_tag,
            BatchItem::Cache { delivery_tag, .. } => *delivery_tag,
        };
        if let Err(err) = self.bus.nack_requeue(tag).await {
            warn!(delivery_tag = tag, error = %err, "nack failed");
        }
    }
}

/// Moves every element matching `predicate` from `from` into `to`,
/// preserving the rest of `from` in place.
fn move_matching(from: &mut Vec<BatchItem>, to: &mut Vec<BatchItem>, predicate: impl Fn(&BatchItem) -> bool) {
    let mut remaining = Vec::with_capacity(from.len());
    for item in from.drain(..) {
        if predicate(&item) {
            to.push(item);
        } else {
            remaining.push(item);
        }
    }
    *from = remaining;
}

enum Outcome {
    Generated { bytes: Vec<u8>, width: u32, height: u32, quality: u8 },
    AlreadyPresent,
    /// The entry is absent but the artifact file already exists on disk at
    /// the expected path: register the
    /// array entry from what's on disk, no regeneration.
    Reregistered { path: String, size_bytes: u64 },
    SkippedSentinel,
    Sentinel { error_kind: ErrorKind },
}
