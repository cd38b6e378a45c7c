use async_trait::async_trait;
use atelier_contracts::{CollectionId, ImageId, JobId, LibraryId};

use crate::domain::{CacheEntry, Collection, Image, ThumbnailEntry};
use crate::error::{ErrorKind, Result};
use crate::job::{JobKind, JobState, JobStatus};

/// Whether an atomic array-add actually inserted a new element, used by
/// callers that must distinguish "already present" (idempotent re-delivery)
/// from "just added" without a separate read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    Inserted,
    AlreadyPresent,
}

/// Persists collections, their embedded image/thumbnail/cache arrays, and
/// job state; exposes the atomic `$inc`/`$push`/array-pull primitives the
/// rest of the core is built on (C2).
///
/// Every array-mutating method here must be a single atomic document update
/// on the backing store — never a read-modify-write — so that concurrent
/// duplicate deliveries collapse correctly.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;

    /// Looked up by library + path so the library-scan consumer can decide
    /// whether to create a new collection or update an existing one's
    /// settings.
    async fn get_collection_by_path(
        &self,
        library_id: LibraryId,
        path: &str,
    ) -> Result<Option<Collection>>;

    async fn upsert_collection(&self, collection: &Collection) -> Result<()>;

    /// Atomic `$push` of an image, keyed by id; a second push for the same
    /// id is a no-op.
    async fn add_image(&self, collection_id: CollectionId, image: Image) -> Result<AddOutcome>;

    /// Atomic batch-add of thumbnail entries, keyed by (imageId, width,
    /// height); existing keys are left untouched. One round trip regardless of batch size.
    async fn add_thumbnails(
        &self,
        collection_id: CollectionId,
        entries: Vec<ThumbnailEntry>,
    ) -> Result<Vec<AddOutcome>>;

    /// Atomic batch-add of cache entries, keyed by imageId.
    async fn add_cache_entries(
        &self,
        collection_id: CollectionId,
        entries: Vec<CacheEntry>,
    ) -> Result<Vec<AddOutcome>>;

    async fn increment_cache_folder_bytes(&self, collection_id: CollectionId, by: u64) -> Result<()>;

    async fn create_job(
        &self,
        kind: JobKind,
        collection_id: Option<CollectionId>,
    ) -> Result<JobId>;

    async fn get_job(&self, id: JobId) -> Result<Option<JobState>>;

    async fn init_stage(&self, job_id: JobId, stage_name: &str, total_items: u64) -> Result<()>;

    async fn increment_stage_progress(
        &self,
        job_id: JobId,
        stage_name: &str,
        by: u64,
    ) -> Result<()>;

    async fn increment_stage_failed(&self, job_id: JobId, stage_name: &str, by: u64) -> Result<()>;

    /// Sets one stage's status directly; used by the job monitor's fallback
    /// sweep to mark a stage Completed once its counters reach their total.
    async fn set_stage_status(&self, job_id: JobId, stage_name: &str, status: JobStatus) -> Result<()>;

    async fn increment_completed(&self, job_id: JobId, by: u64) -> Result<()>;

    async fn increment_failed(&self, job_id: JobId, by: u64) -> Result<()>;

    async fn increment_skipped(&self, job_id: JobId, by: u64) -> Result<()>;

    async fn track_error(&self, job_id: JobId, kind: ErrorKind) -> Result<()>;

    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()>;

    /// Jobs of the given kinds currently Pending or Running, for the job
    /// monitor's periodic sweep (C11).
    async fn active_jobs(&self, kinds: &[JobKind]) -> Result<Vec<JobState>>;

    async fn get_library_root(&self, id: LibraryId) -> Result<Option<String>>;
}
