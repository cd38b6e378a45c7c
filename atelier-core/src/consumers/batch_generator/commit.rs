//! Per-collection commit at the end of a batch flush: artifacts hit disk in one sequential pass, then
//! one atomic batch-add per kind, one stage increment, one folder-size
//! increment. One database round trip per collection, not per image.

use atelier_contracts::{CollectionId, ImageId, JobId};

use crate::domain::{CacheEntry, ImageFormat, ThumbnailEntry};
use crate::error::Result;
use crate::ports::{ArtifactKind, ArtifactStore, Repository};

/// A freshly rendered thumbnail awaiting its sequential disk write.
pub struct ThumbnailWrite {
    pub image_id: ImageId,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: u8,
}

pub struct CacheWrite {
    pub image_id: ImageId,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub quality: u8,
}

/// Writes every freshly rendered thumbnail, merges in any sentinel or
/// re-registered entries that needed no write, and commits the whole batch
/// in one array-add call.
pub async fn commit_thumbnails<A: ArtifactStore, R: Repository>(
    artifact_store: &A,
    repository: &R,
    collection_id: CollectionId,
    scan_job_id: JobId,
    to_write: Vec<ThumbnailWrite>,
    precomputed_entries: Vec<ThumbnailEntry>,
) -> Result<()> {
    if to_write.is_empty() && precomputed_entries.is_empty() {
        return Ok(());
    }

    if !to_write.is_empty() {
        artifact_store
            .ensure_collection_dir(collection_id, ArtifactKind::Thumbnail)
            .await?;
    }

    let mut entries = precomputed_entries;
    let mut bytes_written = 0u64;
    for write in to_write {
        let extension = format_extension(write.format);
        let size_bytes = write.bytes.len() as u64;
        let path = artifact_store
            .write(collection_id, write.image_id, ArtifactKind::Thumbnail, extension, &write.bytes)
            .await?;
        bytes_written += size_bytes;
        entries.push(ThumbnailEntry {
            image_id: write.image_id,
            path,
            width: write.width,
            height: write.height,
            format: write.format,
            quality: write.quality,
            size_bytes,
        });
    }

    let count = entries.len() as u64;
    repository.add_thumbnails(collection_id, entries).await?;
    repository
        .increment_stage_progress(scan_job_id, "thumbnail", count)
        .await?;
    if bytes_written > 0 {
        repository
            .increment_cache_folder_bytes(collection_id, bytes_written)
            .await?;
    }
    Ok(())
}

pub async fn commit_cache_entries<A: ArtifactStore, R: Repository>(
    artifact_store: &A,
    repository: &R,
    collection_id: CollectionId,
    scan_job_id: JobId,
    to_write: Vec<CacheWrite>,
    precomputed_entries: Vec<CacheEntry>,
) -> Result<()> {
    if to_write.is_empty() && precomputed_entries.is_empty() {
        return Ok(());
    }

    if !to_write.is_empty() {
        artifact_store
            .ensure_collection_dir(collection_id, ArtifactKind::Cache)
            .await?;
    }

    let mut entries = precomputed_entries;
    let mut bytes_written = 0u64;
    for write in to_write {
        let extension = format_extension(write.format);
        let size_bytes = write.bytes.len() as u64;
        let path = artifact_store
            .write(collection_id, write.image_id, ArtifactKind::Cache, extension, &write.bytes)
            .await?;
        bytes_written += size_bytes;
        entries.push(CacheEntry {
            image_id: write.image_id,
            path,
            format: write.format,
            quality: write.quality,
            size_bytes,
        });
    }

    let count = entries.len() as u64;
    repository.add_cache_entries(collection_id, entries).await?;
    repository
        .increment_stage_progress(scan_job_id, "cache", count)
        .await?;
    if bytes_written > 0 {
        repository
            .increment_cache_folder_bytes(collection_id, bytes_written)
            .await?;
    }
    Ok(())
}

fn format_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
    }
}
