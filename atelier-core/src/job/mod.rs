//! Per-job progress state.

mod state;

pub use state::{JobKind, JobState, JobStatus, StageProgress};
