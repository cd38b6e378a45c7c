//! Coverage for the resume-incomplete coordinator.

mod support;

use std::sync::Arc;

use atelier_contracts::{CollectionId, ImageId, LibraryId, MessageType, PipelineMessage};
use atelier_core::bus::InMemoryMessageBus;
use atelier_core::consumers::resume::ResumeCoordinator;
use atelier_core::ports::MessageBus;
use atelier_core::domain::{Collection, CollectionSettings, CollectionType, Image, ImageFormat, ThumbnailEntry};
use support::InMemoryRepository;

fn image(name: &str) -> Image {
    Image {
        id: ImageId::new(),
        filename: name.to_string(),
        relative_path: name.to_string(),
        full_path: format!("/library/{name}"),
        size_bytes: 1024,
        width: 640,
        height: 480,
        format: ImageFormat::Jpeg,
    }
}

/// A collection with half its thumbnails present and no cache entries
/// publishes exactly the missing work, tagged with the resume job's id.
#[tokio::test]
async fn resume_publishes_only_missing_coverage() {
    let collection_id = CollectionId::new();
    let library_id = LibraryId::new();
    let images: Vec<Image> = (0..10).map(|i| image(&format!("img{i}.jpg"))).collect();
    let mut thumbnails = Vec::new();
    for img in images.iter().take(4) {
        thumbnails.push(ThumbnailEntry {
            image_id: img.id,
            path: format!("/artifacts/thumbnails/{}.jpg", img.id),
            width: 300,
            height: 300,
            format: ImageFormat::Jpeg,
            quality: 85,
            size_bytes: 512,
        });
    }

    let collection = Collection {
        id: collection_id,
        library_id,
        name: "mixed".to_string(),
        path: "/libraries/mixed".to_string(),
        collection_type: CollectionType::Folder,
        settings: CollectionSettings::default(),
        images: images.clone(),
        thumbnails,
        cache_images: Vec::new(),
        cache_folder_bytes: 0,
    };

    let repository = Arc::new(InMemoryRepository::new());
    repository.seed_collection(collection);
    let bus = Arc::new(InMemoryMessageBus::new());
    let coordinator = ResumeCoordinator::new(repository.clone(), bus.clone());

    coordinator.resume_collection(collection_id).await.unwrap();

    assert_eq!(bus.queue_depth(MessageType::ThumbnailGeneration), 6);
    assert_eq!(bus.queue_depth(MessageType::CacheGeneration), 10);

    let delivered = bus.receive(MessageType::ThumbnailGeneration, 6).await.unwrap();
    let job_id = match &delivered[0].message {
        PipelineMessage::ThumbnailGeneration(message) => message.scan_job_id,
        _ => panic!("expected a thumbnail generation message"),
    };
    for item in &delivered {
        match &item.message {
            PipelineMessage::ThumbnailGeneration(message) => {
                assert_eq!(message.job_id, job_id);
                assert_eq!(message.scan_job_id, job_id);
            }
            _ => panic!("expected a thumbnail generation message"),
        }
    }

    let job = repository.get_job(job_id).await.unwrap().unwrap();
    use atelier_core::ports::Repository;
    assert_eq!(job.stages["thumbnail"].total_items, 6);
    assert_eq!(job.stages["cache"].total_items, 10);
}

/// `useDirectFileAccess` Folder collections register entries directly
/// without publishing any generation message. This is distinct from the
/// orphan-files-on-disk case (covered alongside the batch generator in
/// `batch_generator_scenarios.rs`), where re-registration happens in the
/// batch generator itself, not here.
#[tokio::test]
async fn direct_file_access_folder_registers_without_publishing() {
    let collection_id = CollectionId::new();
    let library_id = LibraryId::new();
    let images: Vec<Image> = (0..5).map(|i| image(&format!("img{i}.jpg"))).collect();

    let mut settings = CollectionSettings::default();
    settings.use_direct_file_access = true;

    let collection = Collection {
        id: collection_id,
        library_id,
        name: "direct".to_string(),
        path: "/libraries/direct".to_string(),
        collection_type: CollectionType::Folder,
        settings,
        images: images.clone(),
        thumbnails: Vec::new(),
        cache_images: Vec::new(),
        cache_folder_bytes: 0,
    };

    let repository = Arc::new(InMemoryRepository::new());
    repository.seed_collection(collection);
    let bus = Arc::new(InMemoryMessageBus::new());
    let coordinator = ResumeCoordinator::new(repository.clone(), bus.clone());

    coordinator.resume_collection(collection_id).await.unwrap();

    assert_eq!(bus.queue_depth(MessageType::ThumbnailGeneration), 0);
    assert_eq!(bus.queue_depth(MessageType::CacheGeneration), 0);

    use atelier_core::ports::Repository;
    let collection = repository.get_collection(collection_id).await.unwrap().unwrap();
    assert_eq!(collection.thumbnails.len(), 5);
    assert_eq!(collection.cache_images.len(), 5);
    for entry in &collection.thumbnails {
        let image = images.iter().find(|i| i.id == entry.image_id).unwrap();
        assert_eq!(entry.path, image.full_path);
    }
    for entry in &collection.cache_images {
        let image = images.iter().find(|i| i.id == entry.image_id).unwrap();
        assert_eq!(entry.path, image.full_path);
    }
    collection.check_invariants().unwrap();
}
