//! In-memory [`Repository`] test double, following the same single-mutex,
//! no-persistence shape as [`atelier_core::bus::InMemoryMessageBus`]. Exists
//! only under `tests/`: production code talks to `PostgresRepository`.

use std::collections::HashMap;

use async_trait::async_trait;
use atelier_contracts::{CollectionId, ImageId, JobId, LibraryId};
use atelier_core::domain::{CacheEntry, Collection, Image, ThumbnailEntry};
use atelier_core::error::{ErrorKind, Result};
use atelier_core::job::{JobKind, JobState, JobStatus};
use atelier_core::ports::{AddOutcome, Repository};
use parking_lot::Mutex;

#[derive(Default)]
struct State {
    collections: HashMap<CollectionId, Collection>,
    jobs: HashMap<JobId, JobState>,
    library_roots: HashMap<LibraryId, String>,
}

pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_library_root(self, id: LibraryId, root: impl Into<String>) -> Self {
        self.state.lock().library_roots.insert(id, root.into());
        self
    }

    pub fn seed_collection(&self, collection: Collection) {
        self.state.lock().collections.insert(collection.id, collection);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.state.lock().collections.get(&id).cloned())
    }

    async fn get_collection_by_path(&self, library_id: LibraryId, path: &str) -> Result<Option<Collection>> {
        Ok(self
            .state
            .lock()
            .collections
            .values()
            .find(|c| c.library_id == library_id && c.path == path)
            .cloned())
    }

    async fn upsert_collection(&self, collection: &Collection) -> Result<()> {
        self.state.lock().collections.insert(collection.id, collection.clone());
        Ok(())
    }

    async fn add_image(&self, collection_id: CollectionId, image: Image) -> Result<AddOutcome> {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .get_mut(&collection_id)
            .expect("collection must exist before add_image");
        if collection.has_image(image.id) {
            Ok(AddOutcome::AlreadyPresent)
        } else {
            collection.images.push(image);
            Ok(AddOutcome::Inserted)
        }
    }

    async fn add_thumbnails(
        &self,
        collection_id: CollectionId,
        entries: Vec<ThumbnailEntry>,
    ) -> Result<Vec<AddOutcome>> {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .get_mut(&collection_id)
            .expect("collection must exist before add_thumbnails");
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let exists = collection
                .thumbnail(entry.image_id, entry.width, entry.height)
                .is_some();
            if exists {
                outcomes.push(AddOutcome::AlreadyPresent);
            } else {
                collection.thumbnails.push(entry);
                outcomes.push(AddOutcome::Inserted);
            }
        }
        Ok(outcomes)
    }

    async fn add_cache_entries(&self, collection_id: CollectionId, entries: Vec<CacheEntry>) -> Result<Vec<AddOutcome>> {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .get_mut(&collection_id)
            .expect("collection must exist before add_cache_entries");
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let exists = collection.cache_entry(entry.image_id).is_some();
            if exists {
                outcomes.push(AddOutcome::AlreadyPresent);
            } else {
                collection.cache_images.push(entry);
                outcomes.push(AddOutcome::Inserted);
            }
        }
        Ok(outcomes)
    }

    async fn increment_cache_folder_bytes(&self, collection_id: CollectionId, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .get_mut(&collection_id)
            .expect("collection must exist before increment_cache_folder_bytes");
        collection.cache_folder_bytes += by;
        Ok(())
    }

    async fn create_job(&self, kind: JobKind, collection_id: Option<CollectionId>) -> Result<JobId> {
        let id = JobId::new();
        let job = JobState::new(id, kind, collection_id);
        self.state.lock().jobs.insert(id, job);
        Ok(id)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobState>> {
        Ok(self.state.lock().jobs.get(&id).cloned())
    }

    async fn init_stage(&self, job_id: JobId, stage_name: &str, total_items: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist before init_stage");
        job.init_stage(stage_name, total_items);
        Ok(())
    }

    async fn increment_stage_progress(&self, job_id: JobId, stage_name: &str, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.increment_stage_progress(stage_name, by);
        Ok(())
    }

    async fn increment_stage_failed(&self, job_id: JobId, stage_name: &str, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.increment_stage_failed(stage_name, by);
        Ok(())
    }

    async fn set_stage_status(&self, job_id: JobId, stage_name: &str, status: JobStatus) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.set_stage_status(stage_name, status);
        Ok(())
    }

    async fn increment_completed(&self, job_id: JobId, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.increment_completed(by);
        Ok(())
    }

    async fn increment_failed(&self, job_id: JobId, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.increment_failed(by);
        Ok(())
    }

    async fn increment_skipped(&self, job_id: JobId, by: u64) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.increment_skipped(by);
        Ok(())
    }

    async fn track_error(&self, job_id: JobId, kind: ErrorKind) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.track_error(kind);
        Ok(())
    }

    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).expect("job must exist");
        job.set_status(status);
        Ok(())
    }

    async fn active_jobs(&self, kinds: &[JobKind]) -> Result<Vec<JobState>> {
        Ok(self
            .state
            .lock()
            .jobs
            .values()
            .filter(|job| kinds.contains(&job.job_type))
            .filter(|job| matches!(job.status, JobStatus::Pending | JobStatus::Running))
            .cloned()
            .collect())
    }

    async fn get_library_root(&self, id: LibraryId) -> Result<Option<String>> {
        Ok(self.state.lock().library_roots.get(&id).cloned())
    }
}
