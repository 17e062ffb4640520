use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use vidtube_media::{MediaKind, UploadedMedia};

use crate::error::ApiResult;
use crate::state::AppState;

/// A spooled upload. The file is removed when the guard drops, whether the
/// upload went through or the handler bailed out early.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    size: u64,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

/// A multipart body split into text fields and spooled file fields.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempFile>,
}

impl MultipartForm {
    /// Read the whole body, streaming file parts into `temp_dir`. Empty file
    /// parts count as absent.
    pub async fn parse(mut multipart: Multipart, temp_dir: &Path) -> ApiResult<Self> {
        tokio::fs::create_dir_all(temp_dir).await?;
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            };

            let spooled = match Path::new(&file_name).extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
                None => Uuid::new_v4().to_string(),
            };
            let mut temp = TempFile {
                path: temp_dir.join(spooled),
                size: 0,
            };
            let mut out = tokio::fs::File::create(&temp.path).await?;
            while let Some(chunk) = field.chunk().await? {
                out.write_all(&chunk).await?;
                temp.size += chunk.len() as u64;
            }
            out.flush().await?;

            if temp.size == 0 {
                debug!("Ignoring empty file field {}", name);
                continue;
            }
            debug!("Spooled {} ({} bytes) to {}", file_name, temp.size, temp.path.display());
            form.files.insert(name, temp);
        }

        Ok(form)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempFile> {
        self.files.remove(name)
    }
}

/// Hand a spooled file to the media uploader. The temp file is gone once
/// this returns, on either outcome.
pub async fn upload(state: &AppState, file: TempFile, kind: MediaKind) -> anyhow::Result<UploadedMedia> {
    let result = state.uploader.upload(file.path(), kind).await;
    drop(file);
    result
}

/// Best-effort delete of an asset that is no longer referenced.
pub async fn discard(state: &AppState, media: &UploadedMedia) {
    match state.uploader.delete(&media.public_id, media.kind).await {
        Ok(()) => debug!("Discarded {}", media.public_id),
        Err(e) => warn!("Failed to delete uploaded media {}: {:#}", media.public_id, e),
    }
}

/// Field value that counts as present: trimmed and non-empty.
pub fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"data").unwrap();

        let temp = TempFile { path: path.clone(), size: 4 };
        assert_eq!(temp.path(), path.as_path());
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn dropping_an_already_removed_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFile {
            path: dir.path().join("never-written"),
            size: 0,
        };
        drop(temp);
    }

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(present(Some("  alice ".into())).as_deref(), Some("alice"));
        assert_eq!(present(Some("   ".into())), None);
        assert_eq!(present(None), None);
    }
}
