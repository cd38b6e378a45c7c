//! Wire types shared by every consumer in the image pipeline: strongly
//! typed ids, the closed set of pipeline messages, and archive-path
//! canonicalization helpers.

pub mod archive_path;
pub mod ids;
pub mod messages;

pub use ids::{CollectionId, ImageId, JobId, LibraryId};
pub use messages::{
    BulkOperationMessage, CacheGenerationMessage, CollectionScanMessage, ImageProcessingMessage,
    LibraryScanMessage, MessageType, PipelineMessage, ThumbnailGenerationMessage,
};
