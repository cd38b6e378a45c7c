use std::collections::HashMap;

use atelier_contracts::{CollectionId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ErrorKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobKind {
    CollectionScan,
    ResumeCollection,
    BulkOperation,
}

/// Status lifecycle: Pending -> Running -> {Completed | Failed | Cancelled}.
/// The terminal three never transition again.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Observation-only: job monitor flags no progress for >= 30s. Not part
    /// of the terminal set; a stalled job can still resume to Running.
    Stalled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A named sub-counter on a job, e.g. `images`, `thumbnail`, `cache`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageProgress {
    pub total_items: u64,
    pub completed_items: u64,
    pub failed_items: u64,
    pub status: JobStatus,
}

impl StageProgress {
    pub fn new(total_items: u64) -> Self {
        Self {
            total_items,
            completed_items: 0,
            failed_items: 0,
            status: JobStatus::Pending,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed_items + self.failed_items >= self.total_items
    }
}

/// Per-job counters and per-stage sub-counters.
///
/// Every mutating method here is meant to back a single atomic `$inc` on the
/// repository: callers in the consumers never read-modify-write this struct
/// across an await point, they call one of these and let the repository
/// apply it atomically. This in-process copy exists for tests and for the
/// job monitor's read path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobState {
    pub id: JobId,
    pub job_type: JobKind,
    pub status: JobStatus,
    pub collection_id: Option<CollectionId>,
    pub total_items: u64,
    pub completed_items: u64,
    pub failed_items: u64,
    pub skipped_items: u64,
    pub error_counts_by_kind: HashMap<ErrorKind, u64>,
    pub stages: HashMap<String, StageProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(id: JobId, job_type: JobKind, collection_id: Option<CollectionId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            collection_id,
            total_items: 0,
            completed_items: 0,
            failed_items: 0,
            skipped_items: 0,
            error_counts_by_kind: HashMap::new(),
            stages: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the stage sub-map entry if absent and sets its total. Must be
    /// called, with the final total, before any message referencing the
    /// stage is published. The job's own `total_items` tracks the sum of
    /// every stage's total, so it stays meaningful for the
    /// `completed + failed + skipped <= total` invariant even though no
    /// single stage speaks for the whole job.
    pub fn init_stage(&mut self, stage_name: &str, total_items: u64) {
        let previous_total = self.stages.get(stage_name).map(|stage| stage.total_items).unwrap_or(0);
        self.total_items = self.total_items - previous_total + total_items;
        self.stages
            .insert(stage_name.to_string(), StageProgress::new(total_items));
        self.touch();
    }

    /// Atomic counter bump. Fails silently (logged as a bug indicator) if
    /// the stage was never initialized — this is the `SchemaAbsent` error
    /// class, never surfaced past a log line.
    pub fn increment_stage_progress(&mut self, stage_name: &str, by: u64) {
        match self.stages.get_mut(stage_name) {
            Some(stage) => {
                stage.completed_items += by;
                self.touch();
            }
            None => {
                warn!(
                    job_id = %self.id,
                    stage = stage_name,
                    "increment targeted an uninitialized stage; this is a bug upstream"
                );
            }
        }
    }

    pub fn increment_stage_failed(&mut self, stage_name: &str, by: u64) {
        match self.stages.get_mut(stage_name) {
            Some(stage) => {
                stage.failed_items += by;
                self.touch();
            }
            None => {
                warn!(
                    job_id = %self.id,
                    stage = stage_name,
                    "failure increment targeted an uninitialized stage; this is a bug upstream"
                );
            }
        }
    }

    pub fn increment_completed(&mut self, by: u64) {
        self.completed_items += by;
        self.touch();
    }

    pub fn increment_failed(&mut self, by: u64) {
        self.failed_items += by;
        self.touch();
    }

    pub fn increment_skipped(&mut self, by: u64) {
        self.skipped_items += by;
        self.touch();
    }

    /// Atomic `$inc` on the kind bucket; emits a warning observation when a
    /// bucket crosses a multiple of ten.
    pub fn track_error(&mut self, kind: ErrorKind) {
        let count = self.error_counts_by_kind.entry(kind).or_insert(0);
        *count += 1;
        if *count % 10 == 0 {
            warn!(
                job_id = %self.id,
                error_kind = %kind,
                count = *count,
                "error bucket crossed a multiple of ten"
            );
        }
        self.touch();
    }

    /// Direct status transition, refusing to leave a terminal state.
    pub fn set_status(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            warn!(
                job_id = %self.id,
                from = ?self.status,
                to = ?status,
                "ignored status transition out of a terminal state"
            );
            return;
        }
        self.status = status;
        self.touch();
    }

    /// Sets one stage's status directly. Used by the job monitor's fallback
    /// sweep to mark a stage Completed once its counters
    /// reach their total; the hot path never calls this.
    pub fn set_stage_status(&mut self, stage_name: &str, status: JobStatus) {
        match self.stages.get_mut(stage_name) {
            Some(stage) => {
                stage.status = status;
                self.touch();
            }
            None => {
                warn!(job_id = %self.id, stage = stage_name, "set_stage_status targeted an uninitialized stage");
            }
        }
    }

    /// Every stage reaching its total implies the job as a whole is done
    ///. Used by both the hot path and the job
    /// monitor's fallback sweep.
    pub fn all_stages_done(&self) -> bool {
        !self.stages.is_empty() && self.stages.values().all(StageProgress::is_done)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
