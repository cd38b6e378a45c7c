use std::collections::HashMap;

use async_trait::async_trait;
use atelier_contracts::{CollectionId, ImageId, JobId, LibraryId};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::domain::{CacheEntry, Collection, CollectionSettings, CollectionType, Image, ThumbnailEntry};
use crate::error::{AtelierError, ErrorKind, Result};
use crate::job::{JobKind, JobState, JobStatus, StageProgress};
use crate::ports::{AddOutcome, Repository};

/// Postgres-backed repository (C2).
///
/// The source spec's document store exposes array-add and counter-increment
/// primitives directly; Postgres has no native embedded-array document
/// model, so collections and jobs are stored as rows with JSONB columns for
/// their embedded arrays and maps, and the "atomic" primitives are
/// implemented as single transactions holding a row lock for the duration
/// of the read-modify-write (`SELECT ... FOR UPDATE` then `UPDATE`).
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepository")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

fn job_kind_str(kind: JobKind) -> &'static str {
    match kind {
        JobKind::CollectionScan => "collection_scan",
        JobKind::ResumeCollection => "resume_collection",
        JobKind::BulkOperation => "bulk_operation",
    }
}

fn job_kind_from_str(s: &str) -> Result<JobKind> {
    Ok(match s {
        "collection_scan" => JobKind::CollectionScan,
        "resume_collection" => JobKind::ResumeCollection,
        "bulk_operation" => JobKind::BulkOperation,
        other => return Err(AtelierError::Internal(format!("unknown job_type column value: {other}"))),
    })
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
        JobStatus::Stalled => "stalled",
    }
}

fn job_status_from_str(s: &str) -> Result<JobStatus> {
    Ok(match s {
        "pending" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        "stalled" => JobStatus::Stalled,
        other => return Err(AtelierError::Internal(format!("unknown status column value: {other}"))),
    })
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: uuid::Uuid,
    library_id: uuid::Uuid,
    name: String,
    path: String,
    collection_type: String,
    settings: Json<CollectionSettings>,
    images: Json<Vec<Image>>,
    thumbnails: Json<Vec<ThumbnailEntry>>,
    cache_images: Json<Vec<CacheEntry>>,
    cache_folder_bytes: i64,
}

impl TryFrom<CollectionRow> for Collection {
    type Error = AtelierError;

    fn try_from(row: CollectionRow) -> Result<Self> {
        let collection_type = match row.collection_type.as_str() {
            "folder" => CollectionType::Folder,
            "archive" => CollectionType::Archive,
            other => {
                return Err(AtelierError::Internal(format!(
                    "unknown collection_type column value: {other}"
                )))
            }
        };
        Ok(Collection {
            id: CollectionId::from(row.id),
            library_id: LibraryId::from(row.library_id),
            name: row.name,
            path: row.path,
            collection_type,
            settings: row.settings.0,
            images: row.images.0,
            thumbnails: row.thumbnails.0,
            cache_images: row.cache_images.0,
            cache_folder_bytes: row.cache_folder_bytes as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: uuid::Uuid,
    job_type: String,
    status: String,
    collection_id: Option<uuid::Uuid>,
    total_items: i64,
    completed_items: i64,
    failed_items: i64,
    skipped_items: i64,
    error_counts_by_kind: Json<HashMap<ErrorKind, u64>>,
    stages: Json<HashMap<String, StageProgress>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for JobState {
    type Error = AtelierError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(JobState {
            id: JobId::from(row.id),
            job_type: job_kind_from_str(&row.job_type)?,
            status: job_status_from_str(&row.status)?,
            collection_id: row.collection_id.map(CollectionId::from),
            total_items: row.total_items as u64,
            completed_items: row.completed_items as u64,
            failed_items: row.failed_items as u64,
            skipped_items: row.skipped_items as u64,
            error_counts_by_kind: row.error_counts_by_kind.0,
            stages: row.stages.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PostgresRepository {
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("repository failed Postgres health check: {err}")))?;
        info!("repository connected to Postgres");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"SELECT id, library_id, name, path, collection_type, settings, images, thumbnails, cache_images, cache_folder_bytes
               FROM collections WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("get_collection: {err}")))?;

        row.map(Collection::try_from).transpose()
    }

    async fn get_collection_by_path(&self, library_id: LibraryId, path: &str) -> Result<Option<Collection>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"SELECT id, library_id, name, path, collection_type, settings, images, thumbnails, cache_images, cache_folder_bytes
               FROM collections WHERE library_id = $1 AND path = $2"#,
        )
        .bind(library_id.as_uuid())
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("get_collection_by_path: {err}")))?;

        row.map(Collection::try_from).transpose()
    }

    async fn upsert_collection(&self, collection: &Collection) -> Result<()> {
        let collection_type = match collection.collection_type {
            CollectionType::Folder => "folder",
            CollectionType::Archive => "archive",
        };
        sqlx::query(
            r#"INSERT INTO collections (id, library_id, name, path, collection_type, settings, images, thumbnails, cache_images, cache_folder_bytes)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 path = EXCLUDED.path,
                 settings = EXCLUDED.settings"#,
        )
        .bind(collection.id.as_uuid())
        .bind(collection.library_id.as_uuid())
        .bind(&collection.name)
        .bind(&collection.path)
        .bind(collection_type)
        .bind(Json(&collection.settings))
        .bind(Json(&collection.images))
        .bind(Json(&collection.thumbnails))
        .bind(Json(&collection.cache_images))
        .bind(collection.cache_folder_bytes as i64)
        .execute(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("upsert_collection: {err}")))?;
        Ok(())
    }

    async fn add_image(&self, collection_id: CollectionId, image: Image) -> Result<AddOutcome> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<Vec<Image>> = sqlx::query_scalar("SELECT images FROM collections WHERE id = $1 FOR UPDATE")
            .bind(collection_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("add_image select: {err}")))?;

        let mut images = current.0;
        if images.iter().any(|existing| existing.id == image.id) {
            tx.commit().await.ok();
            return Ok(AddOutcome::AlreadyPresent);
        }
        images.push(image);

        sqlx::query("UPDATE collections SET images = $2 WHERE id = $1")
            .bind(collection_id.as_uuid())
            .bind(Json(&images))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("add_image update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(AddOutcome::Inserted)
    }

    async fn add_thumbnails(
        &self,
        collection_id: CollectionId,
        entries: Vec<ThumbnailEntry>,
    ) -> Result<Vec<AddOutcome>> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<Vec<ThumbnailEntry>> =
            sqlx::query_scalar("SELECT thumbnails FROM collections WHERE id = $1 FOR UPDATE")
                .bind(collection_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("add_thumbnails select: {err}")))?;

        let mut thumbnails = current.0;
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let exists = thumbnails
                .iter()
                .any(|t| t.image_id == entry.image_id && t.width == entry.width && t.height == entry.height);
            if exists {
                outcomes.push(AddOutcome::AlreadyPresent);
                continue;
            }
            thumbnails.push(entry);
            outcomes.push(AddOutcome::Inserted);
        }

        sqlx::query("UPDATE collections SET thumbnails = $2 WHERE id = $1")
            .bind(collection_id.as_uuid())
            .bind(Json(&thumbnails))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("add_thumbnails update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(outcomes)
    }

    async fn add_cache_entries(
        &self,
        collection_id: CollectionId,
        entries: Vec<CacheEntry>,
    ) -> Result<Vec<AddOutcome>> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<Vec<CacheEntry>> =
            sqlx::query_scalar("SELECT cache_images FROM collections WHERE id = $1 FOR UPDATE")
                .bind(collection_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("add_cache_entries select: {err}")))?;

        let mut cache_images = current.0;
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let exists = cache_images.iter().any(|c| c.image_id == entry.image_id);
            if exists {
                outcomes.push(AddOutcome::AlreadyPresent);
                continue;
            }
            cache_images.push(entry);
            outcomes.push(AddOutcome::Inserted);
        }

        sqlx::query("UPDATE collections SET cache_images = $2 WHERE id = $1")
            .bind(collection_id.as_uuid())
            .bind(Json(&cache_images))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("add_cache_entries update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(outcomes)
    }

    async fn increment_cache_folder_bytes(&self, collection_id: CollectionId, by: u64) -> Result<()> {
        sqlx::query("UPDATE collections SET cache_folder_bytes = cache_folder_bytes + $2 WHERE id = $1")
            .bind(collection_id.as_uuid())
            .bind(by as i64)
            .execute(&self.pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_cache_folder_bytes: {err}")))?;
        Ok(())
    }

    async fn create_job(&self, kind: JobKind, collection_id: Option<CollectionId>) -> Result<JobId> {
        let id = JobId::new();
        sqlx::query(
            r#"INSERT INTO jobs (id, job_type, status, collection_id, total_items, completed_items, failed_items, skipped_items, error_counts_by_kind, stages, created_at, updated_at)
               VALUES ($1, $2, 'pending', $3, 0, 0, 0, 0, '{}'::jsonb, '{}'::jsonb, now(), now())"#,
        )
        .bind(id.as_uuid())
        .bind(job_kind_str(kind))
        .bind(collection_id.map(|c| c.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("create_job: {err}")))?;
        debug!(job_id = %id, ?kind, "created job");
        Ok(id)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobState>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"SELECT id, job_type, status, collection_id, total_items, completed_items, failed_items, skipped_items, error_counts_by_kind, stages, created_at, updated_at
               FROM jobs WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("get_job: {err}")))?;
        row.map(JobState::try_from).transpose()
    }

    async fn init_stage(&self, job_id: JobId, stage_name: &str, total_items: u64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<HashMap<String, StageProgress>> =
            sqlx::query_scalar("SELECT stages FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("init_stage select: {err}")))?;
        let mut stages = current.0;
        let previous_total = stages.get(stage_name).map(|stage| stage.total_items).unwrap_or(0);
        stages.insert(stage_name.to_string(), StageProgress::new(total_items));

        // The job's own total_items tracks the sum of every stage's total,
        // kept in lockstep with `JobState::init_stage`.
        sqlx::query(
            "UPDATE jobs SET stages = $2, total_items = total_items - $3 + $4, updated_at = now() WHERE id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(Json(&stages))
        .bind(previous_total as i64)
        .bind(total_items as i64)
        .execute(&mut *tx)
        .await
        .map_err(|err| AtelierError::Internal(format!("init_stage update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn increment_stage_progress(&self, job_id: JobId, stage_name: &str, by: u64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<HashMap<String, StageProgress>> =
            sqlx::query_scalar("SELECT stages FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("increment_stage_progress select: {err}")))?;
        let mut stages = current.0;
        match stages.get_mut(stage_name) {
            Some(stage) => stage.completed_items += by,
            None => {
                warn!(job_id = %job_id, stage = stage_name, "increment targeted an uninitialized stage");
                tx.commit().await.ok();
                return Ok(());
            }
        }

        sqlx::query("UPDATE jobs SET stages = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(Json(&stages))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_stage_progress update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn increment_stage_failed(&self, job_id: JobId, stage_name: &str, by: u64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<HashMap<String, StageProgress>> =
            sqlx::query_scalar("SELECT stages FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("increment_stage_failed select: {err}")))?;
        let mut stages = current.0;
        match stages.get_mut(stage_name) {
            Some(stage) => stage.failed_items += by,
            None => {
                warn!(job_id = %job_id, stage = stage_name, "failure increment targeted an uninitialized stage");
                tx.commit().await.ok();
                return Ok(());
            }
        }

        sqlx::query("UPDATE jobs SET stages = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(Json(&stages))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_stage_failed update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn set_stage_status(&self, job_id: JobId, stage_name: &str, status: JobStatus) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<HashMap<String, StageProgress>> =
            sqlx::query_scalar("SELECT stages FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("set_stage_status select: {err}")))?;
        let mut stages = current.0;
        match stages.get_mut(stage_name) {
            Some(stage) => stage.status = status,
            None => {
                warn!(job_id = %job_id, stage = stage_name, "set_stage_status targeted an uninitialized stage");
                tx.commit().await.ok();
                return Ok(());
            }
        }

        sqlx::query("UPDATE jobs SET stages = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(Json(&stages))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("set_stage_status update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn increment_completed(&self, job_id: JobId, by: u64) -> Result<()> {
        sqlx::query("UPDATE jobs SET completed_items = completed_items + $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(by as i64)
            .execute(&self.pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_completed: {err}")))?;
        Ok(())
    }

    async fn increment_failed(&self, job_id: JobId, by: u64) -> Result<()> {
        sqlx::query("UPDATE jobs SET failed_items = failed_items + $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(by as i64)
            .execute(&self.pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_failed: {err}")))?;
        Ok(())
    }

    async fn increment_skipped(&self, job_id: JobId, by: u64) -> Result<()> {
        sqlx::query("UPDATE jobs SET skipped_items = skipped_items + $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(by as i64)
            .execute(&self.pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("increment_skipped: {err}")))?;
        Ok(())
    }

    async fn track_error(&self, job_id: JobId, kind: ErrorKind) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|err| AtelierError::Internal(err.to_string()))?;
        let current: Json<HashMap<ErrorKind, u64>> =
            sqlx::query_scalar("SELECT error_counts_by_kind FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| AtelierError::Internal(format!("track_error select: {err}")))?;
        let mut counts = current.0;
        let count = counts.entry(kind).or_insert(0);
        *count += 1;
        let crossed_ten = *count % 10 == 0;

        sqlx::query("UPDATE jobs SET error_counts_by_kind = $2, updated_at = now() WHERE id = $1")
            .bind(job_id.as_uuid())
            .bind(Json(&counts))
            .execute(&mut *tx)
            .await
            .map_err(|err| AtelierError::Internal(format!("track_error update: {err}")))?;
        tx.commit().await.map_err(|err| AtelierError::Internal(err.to_string()))?;

        if crossed_ten {
            warn!(job_id = %job_id, error_kind = %kind, "error bucket crossed a multiple of ten");
        }
        Ok(())
    }

    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE jobs SET status = $2, updated_at = now()
               WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')"#,
        )
        .bind(job_id.as_uuid())
        .bind(job_status_str(status))
        .execute(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("set_job_status: {err}")))?;

        if result.rows_affected() == 0 {
            warn!(job_id = %job_id, ?status, "ignored status transition out of a terminal state, or job missing");
        }
        Ok(())
    }

    async fn active_jobs(&self, kinds: &[JobKind]) -> Result<Vec<JobState>> {
        let kind_strs: Vec<&'static str> = kinds.iter().copied().map(job_kind_str).collect();
        let rows = sqlx::query_as::<_, JobRow>(
            r#"SELECT id, job_type, status, collection_id, total_items, completed_items, failed_items, skipped_items, error_counts_by_kind, stages, created_at, updated_at
               FROM jobs WHERE status IN ('pending', 'running') AND job_type = ANY($1)"#,
        )
        .bind(&kind_strs)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AtelierError::Internal(format!("active_jobs: {err}")))?;

        rows.into_iter().map(JobState::try_from).collect()
    }

    async fn get_library_root(&self, id: LibraryId) -> Result<Option<String>> {
        let root: Option<String> = sqlx::query_scalar("SELECT root_path FROM libraries WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| AtelierError::Internal(format!("get_library_root: {err}")))?;
        Ok(root)
    }
}
