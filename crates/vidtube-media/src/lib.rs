//! VidTube media uploads.
//!
//! Handlers never talk to a blob store directly: they hand a local file to a
//! [`MediaUploader`] and keep the returned URL plus the identifier needed to
//! delete the asset later.

pub mod cloudinary;
pub mod disk;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use cloudinary::CloudinaryUploader;
pub use disk::DiskMediaStore;

/// What is being uploaded. Some backends store images and videos apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// A stored asset: where clients fetch it and how to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub kind: MediaKind,
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Store the file at `path`. The caller owns `path` and removes it.
    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedMedia>;

    /// Remove a previously uploaded asset.
    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<()>;
}
