//! Image pipeline core: job-state machinery, the scan/processing/batch
//! consumers, DLQ recovery, and the job monitor.
//!
//! The message bus, repository, and artifact store are trait boundaries
//! (see [`ports`]); this crate ships one concrete adapter per port under
//! [`bus`], [`repository`], and [`artifacts`] so the worker binary is
//! runnable end to end.

pub mod artifacts;
pub mod bus;
pub mod classify;
pub mod consumers;
pub mod domain;
pub mod error;
pub mod job;
pub mod ports;
pub mod quality;
pub mod render;
pub mod repository;
