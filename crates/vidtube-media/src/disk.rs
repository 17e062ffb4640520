use anyhow::{Result, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{MediaKind, MediaUploader, UploadedMedia};

/// Stores media on local disk and hands out URLs under `{public_url}/media`.
///
/// Each asset is a single flat file at `{dir}/{uuid}.{ext}`; the file name is
/// also its public id.
pub struct DiskMediaStore {
    dir: PathBuf,
    public_url: String,
}

impl DiskMediaStore {
    pub async fn new(dir: PathBuf, public_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the stored file for a public id.
    pub fn file_path(&self, public_id: &str) -> Result<PathBuf> {
        // Reject anything that could escape the media directory
        if public_id.is_empty() || public_id.contains(['/', '\\']) || public_id.starts_with('.') {
            bail!("Invalid media id: {}", public_id);
        }
        Ok(self.dir.join(public_id))
    }
}

#[async_trait]
impl MediaUploader for DiskMediaStore {
    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedMedia> {
        let metadata = fs::metadata(path).await?;
        if metadata.len() == 0 {
            bail!("Refusing to store empty file {}", path.display());
        }

        let public_id = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
            _ => Uuid::new_v4().to_string(),
        };

        let dest = self.file_path(&public_id)?;
        fs::copy(path, &dest).await?;
        debug!("Stored {} ({} bytes) as {}", kind.as_str(), metadata.len(), public_id);

        Ok(UploadedMedia {
            url: format!("{}/media/{}", self.public_url, public_id),
            public_id,
            kind,
        })
    }

    async fn delete(&self, public_id: &str, _kind: MediaKind) -> Result<()> {
        let path = self.file_path(public_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media {}", public_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media {} already gone", public_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_copies_and_delete_removes() {
        let media = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(media.path().to_path_buf(), "http://localhost:8001/")
            .await
            .unwrap();

        let src = scratch.path().join("clip.MP4");
        std::fs::write(&src, b"not really a video").unwrap();

        let uploaded = store.upload(&src, MediaKind::Video).await.unwrap();
        assert!(uploaded.public_id.ends_with(".mp4"));
        assert_eq!(
            uploaded.url,
            format!("http://localhost:8001/media/{}", uploaded.public_id)
        );
        let stored = store.file_path(&uploaded.public_id).unwrap();
        assert_eq!(std::fs::read(&stored).unwrap(), b"not really a video");
        // The source stays; removing it is the caller's job.
        assert!(src.exists());

        store.delete(&uploaded.public_id, MediaKind::Video).await.unwrap();
        assert!(!stored.exists());
        // Deleting twice is not an error.
        store.delete(&uploaded.public_id, MediaKind::Video).await.unwrap();
    }

    #[tokio::test]
    async fn empty_files_are_rejected() {
        let media = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(media.path().to_path_buf(), "http://x")
            .await
            .unwrap();
        let src = media.path().join("empty.png");
        std::fs::write(&src, b"").unwrap();
        assert!(store.upload(&src, MediaKind::Image).await.is_err());
    }

    #[tokio::test]
    async fn path_traversal_ids_are_refused() {
        let media = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(media.path().to_path_buf(), "http://x")
            .await
            .unwrap();
        assert!(store.file_path("../etc/passwd").is_err());
        assert!(store.file_path("..").is_err());
        assert!(store.delete("a/b", MediaKind::Image).await.is_err());
    }
}
