//! Coverage for the collection-scan consumer's archive enumeration path.

mod support;

use std::io::Write;
use std::sync::Arc;

use atelier_contracts::{CollectionId, CollectionScanMessage, LibraryId, MessageType};
use atelier_core::bus::InMemoryMessageBus;
use atelier_core::consumers::collection_scan::CollectionScanConsumer;
use atelier_core::domain::{Collection, CollectionSettings, CollectionType};
use atelier_core::ports::Repository;
use support::InMemoryRepository;

fn write_zip_with_entry_sizes(path: &std::path::Path, sizes: &[(&str, usize)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::<()>::default();
    for (name, size) in sizes {
        writer.start_file(*name, options).unwrap();
        writer.write_all(&vec![0u8; *size]).unwrap();
    }
    writer.finish().unwrap();
}

/// An archive entry one byte over `MaxZipEntrySizeBytes` is skipped with a
/// counted failure on both the `images` stage and the job's global failed
/// counter, and never reaches image-processing.
#[tokio::test]
async fn oversize_archive_entry_is_a_counted_failure_not_a_silent_drop() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("photos.zip");
    write_zip_with_entry_sizes(
        &archive_path,
        &[("fits.jpg", 500), ("too_big.jpg", 501)],
    );

    let collection_id = CollectionId::new();
    let library_id = LibraryId::new();
    let collection = Collection {
        id: collection_id,
        library_id,
        name: "archive".to_string(),
        path: archive_path.to_str().unwrap().to_string(),
        collection_type: CollectionType::Archive,
        settings: CollectionSettings::default(),
        images: Vec::new(),
        thumbnails: Vec::new(),
        cache_images: Vec::new(),
        cache_folder_bytes: 0,
    };

    let repository = Arc::new(InMemoryRepository::new());
    repository.seed_collection(collection);
    let bus = Arc::new(InMemoryMessageBus::new());
    let consumer = CollectionScanConsumer::new(repository.clone(), bus.clone(), 500);

    let scan_job_id = repository.create_job(atelier_core::job::JobKind::CollectionScan, Some(collection_id)).await.unwrap();
    consumer
        .handle(&CollectionScanMessage {
            collection_id,
            collection_path: archive_path.to_str().unwrap().to_string(),
            scan_job_id,
        })
        .await
        .unwrap();

    let collection = repository.get_collection(collection_id).await.unwrap().unwrap();
    assert_eq!(collection.images.len(), 1);
    assert_eq!(collection.images[0].filename, "fits.jpg");

    assert_eq!(bus.queue_depth(MessageType::ImageProcessing), 1);

    let job = repository.get_job(scan_job_id).await.unwrap().unwrap();
    assert_eq!(job.stages["images"].total_items, 2);
    assert_eq!(job.stages["images"].completed_items, 1);
    assert_eq!(job.stages["images"].failed_items, 1);
    assert_eq!(job.failed_items, 1);
    assert_eq!(job.completed_items, 1);
    assert_eq!(
        job.error_counts_by_kind.get(&atelier_core::error::ErrorKind::OversizeSource),
        Some(&1)
    );
}
