use std::sync::Arc;

use atelier_contracts::{CollectionScanMessage, LibraryScanMessage, PipelineMessage};
use tracing::{info, warn};

use crate::classify::{is_archive_path, is_image_path};
use crate::domain::{Collection, CollectionSettings, CollectionType};
use crate::error::Result;
use crate::ports::{MessageBus, Repository};

/// C5: walks a library root and emits one `collection.scan` message per
/// directory/archive found.
pub struct LibraryScanConsumer<R: Repository, B: MessageBus> {
    repository: Arc<R>,
    bus: Arc<B>,
}

impl<R: Repository, B: MessageBus> LibraryScanConsumer<R, B> {
    pub fn new(repository: Arc<R>, bus: Arc<B>) -> Self {
        Self { repository, bus }
    }

    pub async fn handle(&self, message: &LibraryScanMessage) -> Result<()> {
        let entries = std::fs::read_dir(&message.library_path)?;

        let mut published = 0usize;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(library_path = %message.library_path, error = %err, "failed to read library entry, skipping");
                    continue;
                }
            };
            let path = entry.path();
            let path_str = path.to_string_lossy().into_owned();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            let collection_type = if file_type.is_dir() {
                if !directory_contains_images(&path) {
                    continue;
                }
                CollectionType::Folder
            } else if is_archive_path(&path_str) {
                CollectionType::Archive
            } else {
                continue;
            };

            let existing = self
                .repository
                .get_collection_by_path(message.library_id, &path_str)
                .await?;

            let collection = match existing {
                Some(mut collection) => {
                    collection.collection_type = collection_type;
                    collection
                }
                None => Collection {
                    id: atelier_contracts::CollectionId::new(),
                    library_id: message.library_id,
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: path_str.clone(),
                    collection_type,
                    settings: CollectionSettings::default(),
                    images: Vec::new(),
                    thumbnails: Vec::new(),
                    cache_images: Vec::new(),
                    cache_folder_bytes: 0,
                },
            };

            let collection_id = collection.id;
            self.repository.upsert_collection(&collection).await?;

            self.bus
                .publish(&PipelineMessage::CollectionScan(CollectionScanMessage {
                    collection_id,
                    collection_path: path_str,
                    scan_job_id: message.scan_job_id,
                }))
                .await?;
            published += 1;
        }

        info!(
            library_id = %message.library_id,
            scan_job_id = %message.scan_job_id,
            collections_found = published,
            "library scan complete"
        );
        Ok(())
    }
}

fn directory_contains_images(dir: &std::path::Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file() && is_image_path(&entry.path().to_string_lossy()))
}
