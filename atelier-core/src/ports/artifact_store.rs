use async_trait::async_trait;
use atelier_contracts::{CollectionId, ImageId};

use crate::error::Result;

/// Filesystem-backed store for thumbnail and cache bytes, organized by
/// collection id (C3). Layout: `<root>/thumbnails/<collectionId>/<imageId>.<ext>`
/// and `<root>/cache/<collectionId>/<imageId>.<ext>`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn ensure_collection_dir(&self, collection_id: CollectionId, kind: ArtifactKind) -> Result<()>;

    /// Atomic write (tmp + rename); overwrites any prior artifact at the
    /// same path, which is safe because regeneration always re-derives the
    /// same logical content for a given (imageId, kind, dimensions).
    async fn write(
        &self,
        collection_id: CollectionId,
        image_id: ImageId,
        kind: ArtifactKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String>;

    async fn exists(&self, path: &str) -> Result<bool>;

    fn expected_path(
        &self,
        collection_id: CollectionId,
        image_id: ImageId,
        kind: ArtifactKind,
        extension: &str,
    ) -> String;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArtifactKind {
    Thumbnail,
    Cache,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Thumbnail => "thumbnails",
            ArtifactKind::Cache => "cache",
        }
    }
}
