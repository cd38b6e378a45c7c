use serde::{Deserialize, Serialize};

use crate::ids::{CollectionId, ImageId, JobId, LibraryId};

/// Distinguishes the work queues described in the requirements doc.
///
/// This is the canonical registry referenced by DLQ recovery:
/// adding a message type means extending this enum and its routing-key /
/// header-value mappings in one place.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    LibraryScan,
    CollectionScan,
    ImageProcessing,
    ThumbnailGeneration,
    CacheGeneration,
    BulkOperation,
    /// Legacy type kept in the closed DLQ mapping table even
    /// though no live queue currently produces it.
    CollectionCreation,
}

impl MessageType {
    /// Routing key used to publish/consume this message type.
    pub fn routing_key(&self) -> &'static str {
        match self {
            MessageType::LibraryScan => "library.scan",
            MessageType::CollectionScan => "collection.scan",
            MessageType::ImageProcessing => "image.processing",
            MessageType::ThumbnailGeneration => "thumbnail.generation",
            MessageType::CacheGeneration => "cache.generation",
            MessageType::BulkOperation => "bulk.operation",
            MessageType::CollectionCreation => "collection.creation",
        }
    }

    /// Value carried in the `MessageType` header, used by DLQ recovery to
    /// pick the original routing key without guessing from the body.
    pub fn header_value(&self) -> &'static str {
        match self {
            MessageType::LibraryScan => "LibraryScan",
            MessageType::CollectionScan => "CollectionScan",
            MessageType::ImageProcessing => "ImageProcessing",
            MessageType::ThumbnailGeneration => "ThumbnailGeneration",
            MessageType::CacheGeneration => "CacheGeneration",
            MessageType::BulkOperation => "BulkOperation",
            MessageType::CollectionCreation => "CollectionCreation",
        }
    }

    /// Map a `MessageType` header value back to its variant.
    pub fn from_header(value: &str) -> Option<Self> {
        Some(match value {
            "LibraryScan" => MessageType::LibraryScan,
            "CollectionScan" => MessageType::CollectionScan,
            "ImageProcessing" => MessageType::ImageProcessing,
            "ThumbnailGeneration" => MessageType::ThumbnailGeneration,
            "CacheGeneration" => MessageType::CacheGeneration,
            "BulkOperation" => MessageType::BulkOperation,
            "CollectionCreation" => MessageType::CollectionCreation,
            _ => return None,
        })
    }

    /// Fallback mapping used when the `MessageType` header is absent: the
    /// first `x-death[0].routing-keys[0]` entry, i.e. the routing key the
    /// message was originally published under.
    pub fn from_original_routing_key(key: &str) -> Option<Self> {
        Some(match key {
            "library.scan" => MessageType::LibraryScan,
            "collection.scan" => MessageType::CollectionScan,
            "image.processing" => MessageType::ImageProcessing,
            "thumbnail.generation" => MessageType::ThumbnailGeneration,
            "cache.generation" => MessageType::CacheGeneration,
            "bulk.operation" => MessageType::BulkOperation,
            "collection.creation" => MessageType::CollectionCreation,
            _ => return None,
        })
    }
}

/// `library.scan`: walk a library root and emit one `collection.scan`
/// message per directory/archive found.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryScanMessage {
    pub library_id: LibraryId,
    pub library_path: String,
    pub scan_job_id: JobId,
}

/// `collection.scan`: enumerate images in one collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionScanMessage {
    pub collection_id: CollectionId,
    pub collection_path: String,
    pub scan_job_id: JobId,
}

/// `image.processing`: create the embedded image record and fan out to
/// thumbnail + cache generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageProcessingMessage {
    pub collection_id: CollectionId,
    pub image_id: ImageId,
    pub image_path: String,
    pub scan_job_id: JobId,
}

/// `thumbnail.generation`: produce one thumbnail artifact + array entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThumbnailGenerationMessage {
    pub collection_id: CollectionId,
    pub image_id: ImageId,
    pub image_path: String,
    pub image_filename: String,
    pub width: u32,
    pub height: u32,
    pub job_id: JobId,
    pub scan_job_id: JobId,
}

/// `cache.generation`: produce one cache-render artifact + array entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheGenerationMessage {
    pub collection_id: CollectionId,
    pub image_id: ImageId,
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub quality: u8,
    pub preserve_original: bool,
    pub force_regenerate: bool,
    pub job_id: JobId,
    pub scan_job_id: JobId,
}

/// `bulk.operation`: opaque operator-triggered maintenance request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkOperationMessage {
    pub op_type: String,
    pub parameters: serde_json::Value,
}

/// Closed union of every message this pipeline produces or consumes.
///
/// Dispatch happens by routing key + `MessageType` header, never by runtime
/// type introspection; this enum is the in-process mirror of
/// that dispatch decision once a message has been decoded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PipelineMessage {
    LibraryScan(LibraryScanMessage),
    CollectionScan(CollectionScanMessage),
    ImageProcessing(ImageProcessingMessage),
    ThumbnailGeneration(ThumbnailGenerationMessage),
    CacheGeneration(CacheGenerationMessage),
    BulkOperation(BulkOperationMessage),
}

impl PipelineMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            PipelineMessage::LibraryScan(_) => MessageType::LibraryScan,
            PipelineMessage::CollectionScan(_) => MessageType::CollectionScan,
            PipelineMessage::ImageProcessing(_) => MessageType::ImageProcessing,
            PipelineMessage::ThumbnailGeneration(_) => MessageType::ThumbnailGeneration,
            PipelineMessage::CacheGeneration(_) => MessageType::CacheGeneration,
            PipelineMessage::BulkOperation(_) => MessageType::BulkOperation,
        }
    }

    /// The `scanJobId` every derived message must carry. Bulk
    /// operations are the one message kind not tied to a scan job.
    pub fn scan_job_id(&self) -> Option<JobId> {
        match self {
            PipelineMessage::LibraryScan(m) => Some(m.scan_job_id),
            PipelineMessage::CollectionScan(m) => Some(m.scan_job_id),
            PipelineMessage::ImageProcessing(m) => Some(m.scan_job_id),
            PipelineMessage::ThumbnailGeneration(m) => Some(m.scan_job_id),
            PipelineMessage::CacheGeneration(m) => Some(m.scan_job_id),
            PipelineMessage::BulkOperation(_) => None,
        }
    }

    pub fn collection_id(&self) -> Option<CollectionId> {
        match self {
            PipelineMessage::LibraryScan(_) => None,
            PipelineMessage::CollectionScan(m) => Some(m.collection_id),
            PipelineMessage::ImageProcessing(m) => Some(m.collection_id),
            PipelineMessage::ThumbnailGeneration(m) => Some(m.collection_id),
            PipelineMessage::CacheGeneration(m) => Some(m.collection_id),
            PipelineMessage::BulkOperation(_) => None,
        }
    }
}
