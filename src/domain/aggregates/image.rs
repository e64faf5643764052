//! Product images
//!
//! Images are grouped into "main pools": the product-level pool (no
//! variant) and one pool per variant. Each non-empty pool has exactly one
//! main image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub image_url: String,
    pub alt: String,
    pub is_main: bool,
    /// `None` for product-level images shared by every variant.
    pub variant_id: Option<Uuid>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ProductImage {
    pub fn create(product_id: Uuid, input: ImageInput, sort_order: i32) -> Self {
        Self {
            id: Uuid::now_v7(), product_id, image_url: input.image_url, alt: input.alt.unwrap_or_default(),
            is_main: input.is_main, variant_id: input.variant_id, sort_order, created_at: Utc::now(),
        }
    }

    pub fn is_product_level(&self) -> bool { self.variant_id.is_none() }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "Alt text must be at most 255 characters"))]
    pub alt: Option<String>,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub variant_id: Option<Uuid>,
}

/// Partial update of one image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 255, message = "Alt text must be at most 255 characters"))]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_main: Option<bool>,
}

/// Which images an editor currently shows. Never affects stored data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageView {
    #[default]
    All,
    Product,
    /// Variant images; `Some(id)` narrows to one variant.
    Variant(Option<Uuid>),
}

impl ImageView {
    pub fn includes(&self, image: &ProductImage) -> bool {
        match self {
            Self::All => true,
            Self::Product => image.variant_id.is_none(),
            Self::Variant(None) => image.variant_id.is_some(),
            Self::Variant(Some(id)) => image.variant_id == Some(*id),
        }
    }
}

/// Flags `id` as main and clears the flag on every other image of its pool.
pub fn set_main(images: &mut [ProductImage], id: Uuid) -> Result<(), ImageError> {
    let pool = images.iter().find(|i| i.id == id).map(|i| i.variant_id).ok_or(ImageError::NotFound(id))?;
    for image in images.iter_mut().filter(|i| i.variant_id == pool) {
        image.is_main = image.id == id;
    }
    Ok(())
}

/// Restores "exactly one main per non-empty pool". The lowest `sort_order`
/// wins when a pool has no main; extra mains are cleared. Returns the ids
/// whose flag changed.
pub fn ensure_main(images: &mut [ProductImage]) -> Vec<Uuid> {
    let mut pools: BTreeMap<Option<Uuid>, Vec<usize>> = BTreeMap::new();
    for (idx, image) in images.iter().enumerate() {
        pools.entry(image.variant_id).or_default().push(idx);
    }
    let mut changed = Vec::new();
    for mut members in pools.into_values() {
        members.sort_by_key(|&idx| (images[idx].sort_order, images[idx].created_at));
        let keep = members.iter().copied().find(|&idx| images[idx].is_main).unwrap_or(members[0]);
        for idx in members {
            let want = idx == keep;
            if images[idx].is_main != want {
                images[idx].is_main = want;
                changed.push(images[idx].id);
            }
        }
    }
    changed
}

/// Reorders `images` to follow `order`, which must name every image once,
/// and re-indexes `sort_order` from zero.
pub fn reorder(images: &mut Vec<ProductImage>, order: &[Uuid]) -> Result<(), ImageError> {
    if order.len() != images.len() { return Err(ImageError::OrderMismatch); }
    let mut sorted = Vec::with_capacity(images.len());
    for (position, id) in order.iter().enumerate() {
        let idx = images.iter().position(|i| i.id == *id).ok_or(ImageError::OrderMismatch)?;
        let mut image = images.swap_remove(idx);
        image.sort_order = position as i32;
        sorted.push(image);
    }
    *images = sorted;
    Ok(())
}

pub fn product_main_image(images: &[ProductImage]) -> Option<&ProductImage> {
    images.iter().find(|i| i.is_product_level() && i.is_main)
}

/// A file picked for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadRejection { Empty, TooLarge { size: usize }, NotAnImage { content_type: String } }

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "file is empty"),
            Self::TooLarge { size } => write!(f, "file is {:.1} MB, the limit is 2 MB", *size as f64 / (1024.0 * 1024.0)),
            Self::NotAnImage { content_type } => write!(f, "{content_type} is not an image"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedUpload { pub file_name: String, pub reason: UploadRejection }

/// Splits a batch into acceptable files and per-file rejections; one bad
/// file never blocks the rest.
pub fn screen_uploads(files: Vec<PendingUpload>) -> (Vec<PendingUpload>, Vec<RejectedUpload>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
        let reason = if file.bytes.is_empty() {
            Some(UploadRejection::Empty)
        } else if file.bytes.len() > MAX_UPLOAD_BYTES {
            Some(UploadRejection::TooLarge { size: file.bytes.len() })
        } else if !file.content_type.starts_with("image/") {
            Some(UploadRejection::NotAnImage { content_type: file.content_type.clone() })
        } else {
            None
        };
        match reason {
            Some(reason) => rejected.push(RejectedUpload { file_name: file.file_name, reason }),
            None => accepted.push(file),
        }
    }
    (accepted, rejected)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("Image {0} not found")]
    NotFound(Uuid),
    #[error("Image order must list every image exactly once")]
    OrderMismatch,
    #[error("Variant {0} does not belong to this product")]
    UnknownVariant(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(variant: Option<Uuid>, main: bool, order: i32) -> ProductImage {
        let input = ImageInput { image_url: format!("https://cdn.example.com/{order}.jpg"), alt: None, is_main: main, variant_id: variant };
        ProductImage::create(Uuid::nil(), input, order)
    }

    #[test]
    fn test_set_main_is_exclusive_within_pool() {
        let v = Uuid::now_v7();
        let mut images = vec![image(None, true, 0), image(None, false, 1), image(Some(v), true, 2), image(Some(v), false, 3)];
        let target = images[1].id;
        set_main(&mut images, target).unwrap();
        assert!(!images[0].is_main);
        assert!(images[1].is_main);
        // the variant pool is untouched
        assert!(images[2].is_main);

        let variant_target = images[3].id;
        set_main(&mut images, variant_target).unwrap();
        assert!(!images[2].is_main && images[3].is_main);
        assert!(images[1].is_main);
        assert!(set_main(&mut images, Uuid::now_v7()).is_err());
    }

    #[test]
    fn test_ensure_main_promotes_first_and_clears_extras() {
        let v = Uuid::now_v7();
        let mut images = vec![image(None, false, 1), image(None, false, 0), image(Some(v), true, 0), image(Some(v), true, 1)];
        let changed = ensure_main(&mut images);
        assert!(images[1].is_main);
        assert!(!images[0].is_main);
        assert!(images[2].is_main && !images[3].is_main);
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_reorder() {
        let mut images = vec![image(None, true, 0), image(None, false, 1), image(None, false, 2)];
        let order = vec![images[2].id, images[0].id, images[1].id];
        reorder(&mut images, &order).unwrap();
        assert_eq!(images.iter().map(|i| i.id).collect::<Vec<_>>(), order);
        assert_eq!(images.iter().map(|i| i.sort_order).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(reorder(&mut images, &order[..2]), Err(ImageError::OrderMismatch));
    }

    #[test]
    fn test_view_filter() {
        let v = Uuid::now_v7();
        let images = vec![image(None, true, 0), image(Some(v), true, 1), image(Some(Uuid::now_v7()), true, 2)];
        let count = |view: ImageView| images.iter().filter(|i| view.includes(i)).count();
        assert_eq!(count(ImageView::All), 3);
        assert_eq!(count(ImageView::Product), 1);
        assert_eq!(count(ImageView::Variant(None)), 2);
        assert_eq!(count(ImageView::Variant(Some(v))), 1);
    }

    #[test]
    fn test_oversized_upload_does_not_block_batch() {
        let file = |name: &str, size: usize, ct: &str| PendingUpload { file_name: name.into(), content_type: ct.into(), bytes: vec![0; size] };
        let (ok, rejected) = screen_uploads(vec![
            file("a.jpg", 1024, "image/jpeg"),
            file("huge.png", MAX_UPLOAD_BYTES + 1, "image/png"),
            file("b.webp", MAX_UPLOAD_BYTES, "image/webp"),
            file("notes.txt", 10, "text/plain"),
        ]);
        assert_eq!(ok.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>(), vec!["a.jpg", "b.webp"]);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].file_name, "huge.png");
        assert!(matches!(rejected[0].reason, UploadRejection::TooLarge { .. }));
    }
}
