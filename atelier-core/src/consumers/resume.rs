use std::sync::Arc;

use atelier_contracts::{archive_path, CacheGenerationMessage, CollectionId, PipelineMessage, ThumbnailGenerationMessage};
use tracing::info;

use crate::domain::{CacheEntry, CollectionType, ThumbnailEntry};
use crate::error::{AtelierError, Result};
use crate::job::JobKind;
use crate::ports::{MessageBus, Repository};

/// C9: brings a collection to full coverage (thumbnail + cache per image)
/// without regenerating any artifact whose bytes already exist on disk.
pub struct ResumeCoordinator<R: Repository, B: MessageBus> {
    repository: Arc<R>,
    bus: Arc<B>,
}

impl<R: Repository, B: MessageBus> ResumeCoordinator<R, B> {
    pub fn new(repository: Arc<R>, bus: Arc<B>) -> Self {
        Self { repository, bus }
    }

    pub async fn resume_collection(&self, collection_id: CollectionId) -> Result<()> {
        let collection = self
            .repository
            .get_collection(collection_id)
            .await?
            .ok_or_else(|| AtelierError::NotFound(format!("collection {collection_id}")))?;

        let needs_thumbnail = collection.images_needing_thumbnail();
        let needs_cache = collection.images_needing_cache();

        // `useDirectFileAccess` on a Folder collection means no derived
        // artifacts are produced at all; entries point straight at the
        // source files instead. This must be honored before
        // any job/stage bookkeeping is created, or a stage would be
        // initialized with a total that no consumer will ever decrement.
        if collection.settings.use_direct_file_access && collection.collection_type == CollectionType::Folder {
            return self.register_direct_references(&collection, &needs_thumbnail, &needs_cache).await;
        }

        let job_id = self
            .repository
            .create_job(JobKind::ResumeCollection, Some(collection_id))
            .await?;

        // Both the stages map and the totals must exist before any message
        // is published, or the first delivery's atomic increment has
        // nothing to target.
        self.repository.init_stage(job_id, "thumbnail", needs_thumbnail.len() as u64).await?;
        self.repository.init_stage(job_id, "cache", needs_cache.len() as u64).await?;

        for image_id in &needs_thumbnail {
            let image = collection
                .image(*image_id)
                .ok_or_else(|| AtelierError::Internal(format!("dangling image id {image_id}")))?;
            let normalized_path = archive_path::normalize(&image.full_path).unwrap_or_else(|| image.full_path.clone());
            self.bus
                .publish(&PipelineMessage::ThumbnailGeneration(ThumbnailGenerationMessage {
                    collection_id,
                    image_id: *image_id,
                    image_path: normalized_path,
                    image_filename: image.filename.clone(),
                    width: collection.settings.thumbnail_width,
                    height: collection.settings.thumbnail_height,
                    job_id,
                    scan_job_id: job_id,
                }))
                .await?;
        }

        for image_id in &needs_cache {
            let image = collection
                .image(*image_id)
                .ok_or_else(|| AtelierError::Internal(format!("dangling image id {image_id}")))?;
            let normalized_path = archive_path::normalize(&image.full_path).unwrap_or_else(|| image.full_path.clone());
            self.bus
                .publish(&PipelineMessage::CacheGeneration(CacheGenerationMessage {
                    collection_id,
                    image_id: *image_id,
                    image_path: normalized_path,
                    width: collection.settings.cache_width,
                    height: collection.settings.cache_height,
                    format: collection.settings.cache_format.clone(),
                    quality: collection.settings.cache_quality,
                    preserve_original: false,
                    force_regenerate: false,
                    job_id,
                    scan_job_id: job_id,
                }))
                .await?;
        }

        info!(
            collection_id = %collection_id,
            job_id = %job_id,
            needs_thumbnail = needs_thumbnail.len(),
            needs_cache = needs_cache.len(),
            "resume dispatched"
        );
        Ok(())
    }

    async fn register_direct_references(
        &self,
        collection: &crate::domain::Collection,
        needs_thumbnail: &[atelier_contracts::ImageId],
        needs_cache: &[atelier_contracts::ImageId],
    ) -> Result<()> {
        let thumbnail_entries: Vec<ThumbnailEntry> = needs_thumbnail
            .iter()
            .filter_map(|id| collection.image(*id))
            .map(|image| ThumbnailEntry {
                image_id: image.id,
                path: image.full_path.clone(),
                width: image.width,
                height: image.height,
                format: image.format,
                quality: 100,
                size_bytes: image.size_bytes,
            })
            .collect();
        let cache_entries: Vec<CacheEntry> = needs_cache
            .iter()
            .filter_map(|id| collection.image(*id))
            .map(|image| CacheEntry {
                image_id: image.id,
                path: image.full_path.clone(),
                format: image.format,
                quality: 100,
                size_bytes: image.size_bytes,
            })
            .collect();

        if !thumbnail_entries.is_empty() {
            self.repository.add_thumbnails(collection.id, thumbnail_entries).await?;
        }
        if !cache_entries.is_empty() {
            self.repository.add_cache_entries(collection.id, cache_entries).await?;
        }
        info!(collection_id = %collection.id, "resume registered direct-reference entries, no artifacts generated");
        Ok(())
    }
}
