//! End-to-end coverage of the job monitor's sweep against a real
//! `Repository` implementation, rather than the pure-function
//! unit tests already alongside the module.

mod support;

use std::sync::Arc;

use atelier_core::consumers::job_monitor::JobMonitor;
use atelier_core::job::{JobKind, JobStatus};
use atelier_core::ports::Repository;
use support::InMemoryRepository;

#[tokio::test]
async fn sweep_completes_a_job_whose_stages_reached_their_totals() {
    let repository = Arc::new(InMemoryRepository::new());
    let job_id = repository.create_job(JobKind::CollectionScan, None).await.unwrap();
    repository.init_stage(job_id, "thumbnail", 3).await.unwrap();
    repository.init_stage(job_id, "cache", 3).await.unwrap();
    repository.set_job_status(job_id, JobStatus::Running).await.unwrap();
    repository.increment_stage_progress(job_id, "thumbnail", 3).await.unwrap();
    repository.increment_stage_progress(job_id, "cache", 2).await.unwrap();
    repository.increment_stage_failed(job_id, "cache", 1).await.unwrap();

    let monitor = JobMonitor::new(repository.clone());
    monitor.sweep_once().await.unwrap();

    let job = repository.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stages["thumbnail"].status, JobStatus::Completed);
    assert_eq!(job.stages["cache"].status, JobStatus::Completed);
}

#[tokio::test]
async fn sweep_leaves_a_progressing_job_running() {
    let repository = Arc::new(InMemoryRepository::new());
    let job_id = repository.create_job(JobKind::CollectionScan, None).await.unwrap();
    repository.init_stage(job_id, "thumbnail", 10).await.unwrap();
    repository.set_job_status(job_id, JobStatus::Running).await.unwrap();
    repository.increment_stage_progress(job_id, "thumbnail", 4).await.unwrap();

    let monitor = JobMonitor::new(repository.clone());
    monitor.sweep_once().await.unwrap();

    let job = repository.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
}

#[tokio::test]
async fn sweep_only_considers_monitored_job_kinds() {
    let repository = Arc::new(InMemoryRepository::new());
    let job_id = repository.create_job(JobKind::BulkOperation, None).await.unwrap();
    repository.init_stage(job_id, "thumbnail", 1).await.unwrap();
    repository.increment_stage_progress(job_id, "thumbnail", 1).await.unwrap();
    repository.set_job_status(job_id, JobStatus::Running).await.unwrap();

    let monitor = JobMonitor::new(repository.clone());
    monitor.sweep_once().await.unwrap();

    // BulkOperation isn't in the monitored set, so the sweep must not touch it.
    let job = repository.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.stages["thumbnail"].status, JobStatus::Pending);
}
