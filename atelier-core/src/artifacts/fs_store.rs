use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atelier_contracts::{CollectionId, ImageId};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AtelierError, Result};
use crate::ports::{ArtifactKind, ArtifactStore};

/// Plain-file artifact store: one file per (collection, image, kind).
///
/// Writes go through a temp file in the destination directory followed by a
/// rename, so a crash mid-write never leaves a partial file at the path a
/// reader might open.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn dir_for(&self, collection_id: CollectionId, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(collection_id.to_string())
    }

    fn path_for(
        &self,
        collection_id: CollectionId,
        image_id: ImageId,
        kind: ArtifactKind,
        extension: &str,
    ) -> PathBuf {
        self.dir_for(collection_id, kind)
            .join(format!("{image_id}.{extension}"))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn ensure_collection_dir(&self, collection_id: CollectionId, kind: ArtifactKind) -> Result<()> {
        let dir = self.dir_for(collection_id, kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| AtelierError::Internal(format!("failed to create {dir:?}: {err}")))
    }

    async fn write(
        &self,
        collection_id: CollectionId,
        image_id: ImageId,
        kind: ArtifactKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String> {
        self.ensure_collection_dir(collection_id, kind).await?;
        let path = self.path_for(collection_id, image_id, kind, extension);
        let dir = self.dir_for(collection_id, kind);
        let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4().simple()));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|err| AtelierError::TransientIo(format!("create {tmp:?}: {err}")))?;
        file.write_all(bytes)
            .await
            .map_err(|err| AtelierError::TransientIo(format!("write {tmp:?}: {err}")))?;
        file.flush()
            .await
            .map_err(|err| AtelierError::TransientIo(format!("flush {tmp:?}: {err}")))?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await.map_err(|err| {
            AtelierError::TransientIo(format!("rename {tmp:?} -> {path:?}: {err}"))
        })?;

        Ok(path.to_string_lossy().into_owned())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false))
    }

    fn expected_path(
        &self,
        collection_id: CollectionId,
        image_id: ImageId,
        kind: ArtifactKind,
        extension: &str,
    ) -> String {
        self.path_for(collection_id, image_id, kind, extension)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_and_is_idempotent_on_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf());
        let collection_id = CollectionId::new();
        let image_id = ImageId::new();

        let path = store
            .write(collection_id, image_id, ArtifactKind::Thumbnail, "jpg", b"first")
            .await
            .unwrap();
        assert!(store.exists(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        let path2 = store
            .write(collection_id, image_id, ArtifactKind::Thumbnail, "jpg", b"second")
            .await
            .unwrap();
        assert_eq!(path, path2);
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn expected_path_matches_layout() {
        let store = FsArtifactStore::new(PathBuf::from("/artifacts"));
        let collection_id = CollectionId::new();
        let image_id = ImageId::new();
        let path = store.expected_path(collection_id, image_id, ArtifactKind::Cache, "jpg");
        assert_eq!(
            path,
            format!("/artifacts/cache/{collection_id}/{image_id}.jpg")
        );
    }
}
