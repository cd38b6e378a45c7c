use std::path::PathBuf;

use clap::Parser;

/// One process type, many roles: the same binary runs any pipeline stage
/// depending on `--role`.
#[derive(Parser, Debug)]
#[command(name = "atelier-worker")]
#[command(about = "Image pipeline worker: one binary, one role per process")]
pub struct Args {
    /// Which consumer(s) to run in this process.
    #[arg(long, value_enum)]
    pub role: Role,

    /// Collection id to resume; required for `--role resume`.
    #[arg(long)]
    pub collection_id: Option<String>,

    /// Optional TOML config file layered over the built-in defaults.
    #[arg(long, env = "ATELIER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Postgres connection string for the repository adapter.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Role {
    LibraryScan,
    CollectionScan,
    ImageProcessing,
    BatchGenerator,
    Resume,
    DlqRecovery,
    JobMonitor,
    /// Runs every role's loop as a task in this one process; intended for
    /// small deployments.
    All,
}
