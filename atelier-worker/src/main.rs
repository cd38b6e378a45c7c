//! Worker entry point: parses `--role`, wires the Postgres repository,
//! filesystem artifact store, and in-process message bus, then dispatches
//! to the run loop(s) for that role until `Ctrl-C`.

mod cli;
mod runloop;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use atelier_contracts::CollectionId;
use atelier_core::artifacts::FsArtifactStore;
use atelier_core::bus::InMemoryMessageBus;
use atelier_core::consumers::batch_generator::BatchGenerator;
use atelier_core::consumers::collection_scan::CollectionScanConsumer;
use atelier_core::consumers::dlq_recovery::DlqRecoveryService;
use atelier_core::consumers::image_processing::ImageProcessingConsumer;
use atelier_core::consumers::job_monitor::JobMonitor;
use atelier_core::consumers::library_scan::LibraryScanConsumer;
use atelier_core::consumers::resume::ResumeCoordinator;
use atelier_core::repository::PostgresRepository;
use clap::Parser;
use cli::Role;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=info,atelier_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config =
        atelier_config::load(args.config.as_deref()).context("failed to load atelier configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&args.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let repository = Arc::new(
        PostgresRepository::new(pool)
            .await
            .context("repository health check failed")?,
    );
    let artifact_store = Arc::new(FsArtifactStore::new(PathBuf::from(&config.artifact_root)));
    let bus = Arc::new(InMemoryMessageBus::new());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let prefetch = |key: &str| config.queue.prefetch.get(key).copied().unwrap_or(10);

    match args.role {
        Role::LibraryScan => {
            let consumer = Arc::new(LibraryScanConsumer::new(repository.clone(), bus.clone()));
            runloop::run_library_scan(consumer, bus.clone(), prefetch("library.scan"), shutdown).await;
        }
        Role::CollectionScan => {
            let consumer = Arc::new(CollectionScanConsumer::new(
                repository.clone(),
                bus.clone(),
                config.queue.max_zip_entry_size_bytes,
            ));
            runloop::run_collection_scan(consumer, bus.clone(), prefetch("collection.scan"), shutdown).await;
        }
        Role::ImageProcessing => {
            let consumer = Arc::new(ImageProcessingConsumer::new(repository.clone(), bus.clone()));
            runloop::run_image_processing(consumer, bus.clone(), prefetch("image.processing"), shutdown).await;
        }
        Role::BatchGenerator => {
            let generator = Arc::new(BatchGenerator::new(
                repository.clone(),
                bus.clone(),
                artifact_store.clone(),
                &config,
            ));
            runloop::run_batch_generator(
                generator,
                bus.clone(),
                prefetch("thumbnail.generation"),
                prefetch("cache.generation"),
                shutdown,
            )
            .await;
        }
        Role::Resume => {
            let collection_id = parse_collection_id(args.collection_id.as_deref())?;
            let coordinator = ResumeCoordinator::new(repository.clone(), bus.clone());
            coordinator.resume_collection(collection_id).await?;
            info!(%collection_id, "resume pass complete");
        }
        Role::DlqRecovery => {
            let service = DlqRecoveryService::new(bus.clone());
            let summary = service.run().await?;
            info!(recovered = summary.recovered, skipped = summary.skipped, "dlq recovery complete");
        }
        Role::JobMonitor => {
            let monitor = Arc::new(JobMonitor::new(repository.clone()));
            runloop::run_job_monitor(monitor, shutdown).await;
        }
        Role::All => {
            let library_scan = tokio::spawn(runloop::run_library_scan(
                Arc::new(LibraryScanConsumer::new(repository.clone(), bus.clone())),
                bus.clone(),
                prefetch("library.scan"),
                shutdown.clone(),
            ));
            let collection_scan = tokio::spawn(runloop::run_collection_scan(
                Arc::new(CollectionScanConsumer::new(
                    repository.clone(),
                    bus.clone(),
                    config.queue.max_zip_entry_size_bytes,
                )),
                bus.clone(),
                prefetch("collection.scan"),
                shutdown.clone(),
            ));
            let image_processing = tokio::spawn(runloop::run_image_processing(
                Arc::new(ImageProcessingConsumer::new(repository.clone(), bus.clone())),
                bus.clone(),
                prefetch("image.processing"),
                shutdown.clone(),
            ));
            let batch_generator = tokio::spawn(runloop::run_batch_generator(
                Arc::new(BatchGenerator::new(
                    repository.clone(),
                    bus.clone(),
                    artifact_store.clone(),
                    &config,
                )),
                bus.clone(),
                prefetch("thumbnail.generation"),
                prefetch("cache.generation"),
                shutdown.clone(),
            ));
            let job_monitor = tokio::spawn(runloop::run_job_monitor(
                Arc::new(JobMonitor::new(repository.clone())),
                shutdown.clone(),
            ));

            let _ = tokio::join!(library_scan, collection_scan, image_processing, batch_generator, job_monitor);
        }
    }

    Ok(())
}

fn parse_collection_id(raw: Option<&str>) -> Result<CollectionId> {
    let Some(raw) = raw else {
        bail!("--collection-id is required for --role resume");
    };
    let uuid = uuid::Uuid::parse_str(raw).with_context(|| format!("invalid collection id: {raw}"))?;
    Ok(CollectionId::from(uuid))
}
