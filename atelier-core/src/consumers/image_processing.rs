use std::sync::Arc;

use atelier_contracts::{
    CacheGenerationMessage, ImageProcessingMessage, PipelineMessage, ThumbnailGenerationMessage,
};
use tracing::debug;

use image::GenericImageView;

use crate::domain::ImageFormat;
use crate::error::{AtelierError, Result};
use crate::ports::{MessageBus, Repository};

/// C7: reads just enough of the source to record dimensions/size/format,
/// then fans out to one thumbnail and one cache generation message. Never
/// produces artifacts itself.
pub struct ImageProcessingConsumer<R: Repository, B: MessageBus> {
    repository: Arc<R>,
    bus: Arc<B>,
}

impl<R: Repository, B: MessageBus> ImageProcessingConsumer<R, B> {
    pub fn new(repository: Arc<R>, bus: Arc<B>) -> Self {
        Self { repository, bus }
    }

    pub async fn handle(&self, message: &ImageProcessingMessage) -> Result<()> {
        let collection = self
            .repository
            .get_collection(message.collection_id)
            .await?
            .ok_or_else(|| AtelierError::NotFound(format!("collection {}", message.collection_id)))?;

        let image = collection
            .image(message.image_id)
            .ok_or_else(|| AtelierError::NotFound(format!("image {}", message.image_id)))?
            .clone();

        // Dimensions are read lazily here rather than at collection-scan
        // time, since collection-scan only lists entries and may run over
        // an archive's central directory without decoding anything.
        let (width, height, format) = read_dimensions(&image.full_path).unwrap_or((0, 0, image.format));

        if width != image.width || height != image.height || format != image.format {
            let mut updated = image.clone();
            updated.width = width;
            updated.height = height;
            updated.format = format;
            // Re-registering the same image id is a no-op add; this path
            // exists so the first processing pass fills in dimensions that
            // collection-scan could not determine without decoding.
            let mut refreshed_collection = collection.clone();
            if let Some(slot) = refreshed_collection
                .images
                .iter_mut()
                .find(|existing| existing.id == updated.id)
            {
                *slot = updated;
            }
            self.repository.upsert_collection(&refreshed_collection).await?;
        }

        self.bus
            .publish(&PipelineMessage::ThumbnailGeneration(ThumbnailGenerationMessage {
                collection_id: message.collection_id,
                image_id: message.image_id,
                image_path: message.image_path.clone(),
                image_filename: image.filename.clone(),
                width: collection.settings.thumbnail_width,
                height: collection.settings.thumbnail_height,
                job_id: message.scan_job_id,
                scan_job_id: message.scan_job_id,
            }))
            .await?;

        self.bus
            .publish(&PipelineMessage::CacheGeneration(CacheGenerationMessage {
                collection_id: message.collection_id,
                image_id: message.image_id,
                image_path: message.image_path.clone(),
                width: collection.settings.cache_width,
                height: collection.settings.cache_height,
                format: collection.settings.cache_format.clone(),
                quality: collection.settings.cache_quality,
                preserve_original: false,
                force_regenerate: false,
                job_id: message.scan_job_id,
                scan_job_id: message.scan_job_id,
            }))
            .await?;

        debug!(
            image_id = %message.image_id,
            collection_id = %message.collection_id,
            "image processing queued derived artifacts"
        );
        Ok(())
    }
}

fn read_dimensions(path: &str) -> Option<(u32, u32, ImageFormat)> {
    // Archive entries are handled by the batch generator's own decode step,
    // which already has the bytes in memory; re-opening the archive here
    // just to read a header is wasted I/O, so this only covers plain files.
    if atelier_contracts::archive_path::is_archive_path(path) {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    let image = image::load_from_memory(&bytes).ok()?;
    let format = crate::classify::extension_of(path).and_then(|ext| ImageFormat::from_extension(&ext));
    Some((image.width(), image.height(), format.unwrap_or(ImageFormat::Jpeg)))
}
