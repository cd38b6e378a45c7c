//! One module per pipeline stage (C5-C11), each exposing a `handle_one`
//! (or, for the batch generator, a standalone dispatcher struct) that a
//! worker binary wires to [`crate::ports::MessageBus::receive`].

pub mod batch_generator;
pub mod collection_scan;
pub mod dlq_recovery;
pub mod image_processing;
pub mod job_monitor;
pub mod library_scan;
pub mod resume;
