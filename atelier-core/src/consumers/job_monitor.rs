//! C11: periodic fallback sweep over in-progress jobs.
//!
//! The hot path completes stages and jobs on their last increment; this
//! sweep exists for the paths that skip that check (a sentinel-creating
//! oversize failure, a re-register) and for detecting jobs that have
//! stopped making progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::job::{JobKind, JobState, JobStatus};
use crate::ports::Repository;

/// How often the worker's job-monitor loop should call [`JobMonitor::sweep_once`].
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const STALL_THRESHOLD: chrono::Duration = chrono::Duration::seconds(30);

const MONITORED_KINDS: &[JobKind] = &[JobKind::CollectionScan, JobKind::ResumeCollection];

pub struct JobMonitor<R: Repository> {
    repository: Arc<R>,
}

impl<R: Repository> JobMonitor<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn sweep_once(&self) -> Result<()> {
        let now = Utc::now();
        for job in self.repository.active_jobs(MONITORED_KINDS).await? {
            self.sweep_job(&job, now).await?;
        }
        Ok(())
    }

    async fn sweep_job(&self, job: &JobState, now: DateTime<Utc>) -> Result<()> {
        for stage_name in stages_newly_complete(job) {
            self.repository
                .set_stage_status(job.id, &stage_name, JobStatus::Completed)
                .await?;
        }

        if job.all_stages_done() {
            info!(job_id = %job.id, "job monitor completing job: all stages reached their totals");
            self.repository.set_job_status(job.id, JobStatus::Completed).await?;
            return Ok(());
        }

        if is_stalled(job, now) {
            warn!(job_id = %job.id, "job monitor marking job stalled: no progress for 30s");
            self.repository.set_job_status(job.id, JobStatus::Stalled).await?;
        }

        Ok(())
    }
}

/// Stage names whose counters reached their total but whose status isn't
/// Completed yet.
fn stages_newly_complete(job: &JobState) -> Vec<String> {
    job.stages
        .iter()
        .filter(|(_, stage)| stage.is_done() && stage.status != JobStatus::Completed)
        .map(|(name, _)| name.clone())
        .collect()
}

/// A job is stalled when it has at least one stage with a known total and
/// it has made no progress for the threshold duration. A freshly-created job with no stages yet is never stalled.
fn is_stalled(job: &JobState, now: DateTime<Utc>) -> bool {
    if job.stages.is_empty() {
        return false;
    }
    now.signed_duration_since(job.updated_at) >= STALL_THRESHOLD
}
