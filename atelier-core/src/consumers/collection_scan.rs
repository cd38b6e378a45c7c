use std::sync::Arc;

use atelier_contracts::{CollectionScanMessage, ImageId, ImageProcessingMessage, PipelineMessage};
use tracing::{info, warn};

use crate::classify::is_image_path;
use crate::domain::{CollectionType, Image, ImageFormat};
use crate::error::{AtelierError, ErrorKind, Result};
use crate::ports::{MessageBus, Repository};

/// C6: enumerates images within one collection and publishes one
/// `image.processing` message per newly discovered image.
pub struct CollectionScanConsumer<R: Repository, B: MessageBus> {
    repository: Arc<R>,
    bus: Arc<B>,
    max_zip_entry_size_bytes: u64,
}

impl<R: Repository, B: MessageBus> CollectionScanConsumer<R, B> {
    pub fn new(repository: Arc<R>, bus: Arc<B>, max_zip_entry_size_bytes: u64) -> Self {
        Self {
            repository,
            bus,
            max_zip_entry_size_bytes,
        }
    }

    pub async fn handle(&self, message: &CollectionScanMessage) -> Result<()> {
        let collection = self
            .repository
            .get_collection(message.collection_id)
            .await?
            .ok_or_else(|| AtelierError::NotFound(format!("collection {}", message.collection_id)))?;

        let (discovered, oversize_skipped) = match collection.collection_type {
            CollectionType::Folder => (enumerate_directory(&message.collection_path)?, 0),
            CollectionType::Archive => {
                enumerate_archive(&message.collection_path, self.max_zip_entry_size_bytes)?
            }
        };

        self.repository
            .init_stage(message.scan_job_id, "images", discovered.len() as u64 + oversize_skipped)
            .await?;

        if oversize_skipped > 0 {
            self.repository
                .increment_stage_failed(message.scan_job_id, "images", oversize_skipped)
                .await?;
            self.repository
                .increment_failed(message.scan_job_id, oversize_skipped)
                .await?;
            for _ in 0..oversize_skipped {
                self.repository.track_error(message.scan_job_id, ErrorKind::OversizeSource).await?;
            }
        }

        let mut newly_added = 0u64;
        for candidate in discovered {
            let already_present = collection
                .images
                .iter()
                .any(|existing| existing.full_path == candidate.full_path);
            if already_present {
                self.repository
                    .increment_stage_progress(message.scan_job_id, "images", 1)
                    .await?;
                self.repository.increment_completed(message.scan_job_id, 1).await?;
                continue;
            }

            let image = Image {
                id: ImageId::new(),
                filename: candidate.filename,
                relative_path: candidate.relative_path,
                full_path: candidate.full_path.clone(),
                size_bytes: candidate.size_bytes,
                width: 0,
                height: 0,
                format: candidate.format,
            };
            let image_id = image.id;

            self.repository.add_image(message.collection_id, image).await?;
            self.repository
                .increment_stage_progress(message.scan_job_id, "images", 1)
                .await?;
            self.repository.increment_completed(message.scan_job_id, 1).await?;

            self.bus
                .publish(&PipelineMessage::ImageProcessing(ImageProcessingMessage {
                    collection_id: message.collection_id,
                    image_id,
                    image_path: candidate.full_path,
                    scan_job_id: message.scan_job_id,
                }))
                .await?;
            newly_added += 1;
        }

        info!(
            collection_id = %message.collection_id,
            scan_job_id = %message.scan_job_id,
            newly_added,
            "collection scan complete"
        );
        Ok(())
    }
}

struct DiscoveredImage {
    filename: String,
    relative_path: String,
    full_path: String,
    size_bytes: u64,
    format: ImageFormat,
}

/// Recursive walk, filtered by extension, sorted lexicographically by
/// relative path for deterministic ordering.
fn enumerate_directory(root: &str) -> Result<Vec<DiscoveredImage>> {
    let root_path = std::path::Path::new(root);
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(root_path).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let path_str = path.to_string_lossy();
        if !is_image_path(&path_str) {
            continue;
        }
        let relative = path
            .strip_prefix(root_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let format = crate::classify::extension_of(&path_str)
            .and_then(|ext| ImageFormat::from_extension(&ext))
            .unwrap_or(ImageFormat::Jpeg);
        found.push(DiscoveredImage {
            filename: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            relative_path: relative,
            full_path: path_str.replace('\\', "/"),
            size_bytes,
            format,
        });
    }
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

/// Reads the archive's central directory without extracting; skips entries
/// over the configured per-entry size ceiling, counting how many were
/// skipped so the caller can record a counted failure for each.
fn enumerate_archive(archive_path: &str, max_entry_size_bytes: u64) -> Result<(Vec<DiscoveredImage>, u64)> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| AtelierError::Internal(format!("failed to read archive {archive_path}: {err}")))?;

    let mut found = Vec::new();
    let mut oversize_skipped = 0u64;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| AtelierError::Internal(format!("failed to read archive entry {index}: {err}")))?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        if !is_image_path(&entry_name) {
            continue;
        }
        if entry.size() > max_entry_size_bytes {
            warn!(
                archive_path,
                entry = entry_name,
                size = entry.size(),
                max = max_entry_size_bytes,
                "archive entry exceeds size ceiling, skipping with a counted failure"
            );
            oversize_skipped += 1;
            continue;
        }
        let normalized_entry = entry_name.replace('\\', "/");
        let format = crate::classify::extension_of(&normalized_entry)
            .and_then(|ext| ImageFormat::from_extension(&ext))
            .unwrap_or(ImageFormat::Jpeg);
        found.push(DiscoveredImage {
            filename: std::path::Path::new(&normalized_entry)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            relative_path: normalized_entry.clone(),
            full_path: atelier_contracts::archive_path::compose(archive_path, &normalized_entry),
            size_bytes: entry.size(),
            format,
        });
    }
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok((found, oversize_skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_enumeration_is_deterministic_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let found = enumerate_directory(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].relative_path, "a.png");
        assert_eq!(found[1].relative_path, "b.jpg");
    }

    fn write_zip_with_entry_sizes(path: &std::path::Path, sizes: &[(&str, usize)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default();
        for (name, size) in sizes {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, &vec![0u8; *size]).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn archive_entries_at_the_limit_are_kept_and_over_the_limit_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("photos.zip");
        write_zip_with_entry_sizes(
            &archive_path,
            &[("at_limit.jpg", 500), ("over_limit.jpg", 501), ("notes.txt", 10)],
        );

        let (found, oversize_skipped) =
            enumerate_archive(archive_path.to_str().unwrap(), 500).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "at_limit.jpg");
        assert_eq!(oversize_skipped, 1);
    }
}
