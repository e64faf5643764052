//! Image manager
//!
//! Uploads are screened locally, handed to an [`ImageUploader`] for
//! storage, then registered with the product. Main flag, alt text and
//! order are edited optimistically and reverted when the server refuses.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ApiClient, ClientError, Optimistic};
use crate::domain::aggregates::image::{reorder, screen_uploads, set_main};
use crate::domain::aggregates::{ImageInput, ImagePatch, ImageView, PendingUpload, ProductImage, RejectedUpload};

/// Stores file bytes somewhere reachable and returns the public URL.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, file: &PendingUpload) -> Result<String, ClientError>;
}

/// Posts the raw bytes to an upload endpoint answering `{"url": "..."}`.
pub struct HttpUploader {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self { Self { http: reqwest::Client::new(), endpoint: endpoint.into() } }
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "secure_url")]
    url: String,
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, file: &PendingUpload) -> Result<String, ClientError> {
        let response = self.http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, &file.content_type)
            .header("x-file-name", &file.file_name)
            .body(file.bytes.clone())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http { status: status.as_u16(), message: format!("upload of {} failed", file.file_name) });
        }
        let body: UploadResponse = response.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(body.url)
    }
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub created: Vec<ProductImage>,
    /// Files refused before upload.
    pub rejected: Vec<RejectedUpload>,
    /// Files whose upload or registration failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    /// One line per file that did not make it.
    pub fn notices(&self) -> Vec<String> {
        self.rejected.iter().map(|r| format!("{}: {}", r.file_name, r.reason))
            .chain(self.failed.iter().map(|(name, error)| format!("{name}: {error}")))
            .collect()
    }
}

pub struct ImageManager {
    client: ApiClient,
    product_id: Uuid,
    images: Optimistic<Vec<ProductImage>>,
    view: ImageView,
}

impl ImageManager {
    pub async fn load(client: ApiClient, product_id: Uuid) -> Result<Self, ClientError> {
        let images = client.images(product_id).await?;
        Ok(Self { client, product_id, images: Optimistic::new(images), view: ImageView::All })
    }

    pub fn images(&self) -> &[ProductImage] { self.images.get() }

    pub fn view(&self) -> ImageView { self.view }

    pub fn set_view(&mut self, view: ImageView) { self.view = view; }

    pub fn visible(&self) -> Vec<&ProductImage> { self.images.get().iter().filter(|i| self.view.includes(i)).collect() }

    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let images = self.client.images(self.product_id).await?;
        self.images.replace(images);
        Ok(())
    }

    /// Oversized or non-image files are reported and skipped; the rest of
    /// the batch is uploaded.
    pub async fn upload(&mut self, files: Vec<PendingUpload>, uploader: &dyn ImageUploader, variant_id: Option<Uuid>) -> Result<UploadReport, ClientError> {
        let (accepted, rejected) = screen_uploads(files);
        for r in &rejected {
            warn!(file = %r.file_name, reason = %r.reason, "upload rejected");
        }
        let mut report = UploadReport { rejected, ..Default::default() };
        for file in accepted {
            let created = match uploader.upload(&file).await {
                Ok(url) => {
                    let input = ImageInput { image_url: url, alt: Some(default_alt(&file.file_name)), is_main: false, variant_id };
                    self.client.create_image(self.product_id, &input).await
                }
                Err(e) => Err(e),
            };
            match created {
                Ok(image) => report.created.push(image),
                Err(e) => report.failed.push((file.file_name, e.to_string())),
            }
        }
        if !report.created.is_empty() {
            info!(product_id = %self.product_id, count = report.created.len(), "images uploaded");
            self.refresh().await?;
        }
        Ok(report)
    }

    /// Returns `false` when `confirm` declines.
    pub async fn delete(&mut self, id: Uuid, confirm: impl FnOnce(&ProductImage) -> bool) -> Result<bool, ClientError> {
        let image = self.images.get().iter().find(|i| i.id == id).ok_or_else(not_found)?;
        if !confirm(image) { return Ok(false); }
        self.client.delete_image(self.product_id, id).await?;
        self.refresh().await?;
        Ok(true)
    }

    pub async fn set_main(&mut self, id: Uuid) -> Result<(), ClientError> {
        if let Err(e) = set_main(self.images.begin(), id) {
            self.images.revert();
            return Err(ClientError::Blocked(e.to_string()));
        }
        let patch = ImagePatch { is_main: Some(true), ..Default::default() };
        let result = self.client.update_image(self.product_id, id, &patch).await.map(drop);
        self.images.settle(result)
    }

    pub async fn update_alt(&mut self, id: Uuid, alt: &str) -> Result<(), ClientError> {
        let Some(image) = self.images.begin().iter_mut().find(|i| i.id == id) else {
            self.images.revert();
            return Err(not_found());
        };
        image.alt = alt.trim().to_string();
        let patch = ImagePatch { alt: Some(alt.trim().to_string()), ..Default::default() };
        let result = self.client.update_image(self.product_id, id, &patch).await.map(drop);
        self.images.settle(result)
    }

    /// `order` must list every image of the product once.
    pub async fn reorder(&mut self, order: &[Uuid]) -> Result<(), ClientError> {
        if let Err(e) = reorder(self.images.begin(), order) {
            self.images.revert();
            return Err(ClientError::Blocked(e.to_string()));
        }
        let result = self.client.reorder_images(self.product_id, order).await;
        let saved = self.images.settle(result)?;
        self.images.replace(saved);
        Ok(())
    }
}

fn not_found() -> ClientError { ClientError::Blocked("Image not found".into()) }

fn default_alt(file_name: &str) -> String {
    Path::new(file_name).file_stem().and_then(|s| s.to_str()).unwrap_or(file_name).replace(['-', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_alt_from_file_name() {
        assert_eq!(default_alt("linen-shirt_front.jpg"), "linen shirt front");
        assert_eq!(default_alt("noext"), "noext");
    }

    #[test]
    fn test_report_notices() {
        let report = UploadReport {
            rejected: vec![RejectedUpload { file_name: "big.png".into(), reason: crate::domain::aggregates::UploadRejection::TooLarge { size: 3 * 1024 * 1024 } }],
            failed: vec![("a.png".into(), "upload of a.png failed".into())],
            ..Default::default()
        };
        assert_eq!(report.notices(), vec!["big.png: file is 3.0 MB, the limit is 2 MB".to_string(), "a.png: upload of a.png failed".to_string()]);
    }
}
