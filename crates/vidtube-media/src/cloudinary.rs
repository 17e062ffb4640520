use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::{MediaKind, MediaUploader, UploadedMedia};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Signed uploads to Cloudinary's REST API.
pub struct CloudinaryUploader {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

impl CloudinaryUploader {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name,
            api_key,
            api_secret,
        }
    }

    fn endpoint(&self, kind: MediaKind, action: &str) -> String {
        format!("{}/{}/{}/{}", API_BASE, self.cloud_name, kind.as_str(), action)
    }

    /// SHA-1 over the params sorted by name, joined as a query string, with
    /// the API secret appended.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn signed_form(&self, params: &[(&str, &str)]) -> Form {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut all = params.to_vec();
        all.push(("timestamp", &timestamp));
        let signature = self.sign(&all);

        let mut form = Form::new();
        for (k, v) in all {
            form = form.text(k.to_string(), v.to_string());
        }
        form.text("api_key", self.api_key.clone())
            .text("signature", signature)
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => format!("{}: {}", status, body.error.message),
        Err(_) => status.to_string(),
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedMedia> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let form = self
            .signed_form(&[])
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Cloudinary upload failed: {}", error_message(response).await);
        }

        let body: UploadResponse = response.json().await?;
        info!("File uploaded to Cloudinary: {}", body.secure_url);
        Ok(UploadedMedia {
            url: body.secure_url,
            public_id: body.public_id,
            kind,
        })
    }

    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<()> {
        let form = self.signed_form(&[("public_id", public_id)]);
        let response = self
            .client
            .post(self.endpoint(kind, "destroy"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Cloudinary destroy failed: {}", error_message(response).await));
        }

        let body: DestroyResponse = response.json().await?;
        match body.result.as_str() {
            "ok" => {
                info!("Deleted {} from Cloudinary", public_id);
                Ok(())
            }
            "not found" => {
                warn!("Cloudinary asset {} already gone", public_id);
                Ok(())
            }
            other => bail!("Cloudinary destroy of {} returned {}", public_id, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader() -> CloudinaryUploader {
        CloudinaryUploader::new("demo".into(), "key".into(), "abcd".into())
    }

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let up = uploader();
        let mut hasher = Sha1::new();
        hasher.update(b"public_id=sample&timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(up.sign(&[("timestamp", "1315060510"), ("public_id", "sample")]), expected);
        assert_eq!(up.sign(&[("public_id", "sample"), ("timestamp", "1315060510")]), expected);
        assert_eq!(expected.len(), 40);
    }

    #[test]
    fn endpoints_depend_on_kind() {
        let up = uploader();
        assert_eq!(
            up.endpoint(MediaKind::Video, "upload"),
            "https://api.cloudinary.com/v1_1/demo/video/upload"
        );
        assert_eq!(
            up.endpoint(MediaKind::Image, "destroy"),
            "https://api.cloudinary.com/v1_1/demo/image/destroy"
        );
    }
}
