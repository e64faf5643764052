//! Product completeness
//!
//! Advisory only: a product can be saved at any percentage. The only hard
//! rule is [`check_images_ready`], applied when an existing product is
//! saved from the editor.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::image::{product_main_image, ProductImage};
use crate::domain::aggregates::product::Product;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    pub basic_info: bool,
    pub pricing: bool,
    pub images: bool,
    pub variants: bool,
}

impl CompletionStatus {
    pub fn evaluate(product: &Product) -> Self {
        Self {
            basic_info: !product.name.trim().is_empty()
                && !product.description.trim().is_empty()
                && !product.category_ids.is_empty(),
            pricing: product.base_price > 0,
            images: product_main_image(&product.images).is_some(),
            variants: !product.needs_variants(),
        }
    }

    pub fn completed_sections(&self) -> u8 {
        [self.basic_info, self.pricing, self.images, self.variants].into_iter().filter(|done| *done).count() as u8
    }

    pub fn percentage(&self) -> u8 { self.completed_sections() * 25 }

    pub fn is_complete(&self) -> bool { self.completed_sections() == 4 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SaveBlocked {
    #[error("Add at least one product image before saving")]
    NoProductImages,
    #[error("Choose a main product image before saving")]
    NoMainImage,
}

pub fn check_images_ready(images: &[ProductImage]) -> Result<(), SaveBlocked> {
    if !images.iter().any(ProductImage::is_product_level) { return Err(SaveBlocked::NoProductImages); }
    if product_main_image(images).is_none() { return Err(SaveBlocked::NoMainImage); }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::image::ImageInput;
    use crate::domain::aggregates::product::ProductInput;
    use uuid::Uuid;

    fn product(has_variants: bool) -> Product {
        Product::create(ProductInput {
            name: "Linen shirt".into(), description: "Breathable".into(), base_price: 250_000,
            category_ids: vec![Uuid::now_v7()], has_variants, ..Default::default()
        })
    }

    #[test]
    fn test_has_variants_without_variants_is_incomplete() {
        let p = product(true);
        let status = CompletionStatus::evaluate(&p);
        assert!(!status.variants);
        assert!(status.basic_info && status.pricing);
        assert!(!status.images);
        assert_eq!(status.percentage(), 50);
    }

    #[test]
    fn test_complete_product() {
        let mut p = product(false);
        p.images.push(ProductImage::create(p.id, ImageInput { image_url: "https://cdn.example.com/a.jpg".into(), is_main: true, ..Default::default() }, 0));
        let status = CompletionStatus::evaluate(&p);
        assert_eq!(status.percentage(), 100);
        assert!(status.is_complete());
    }

    #[test]
    fn test_image_guards() {
        let p = product(false);
        assert_eq!(check_images_ready(&[]), Err(SaveBlocked::NoProductImages));
        let variant_only = ProductImage::create(p.id, ImageInput { image_url: "u".into(), is_main: true, variant_id: Some(Uuid::now_v7()), ..Default::default() }, 0);
        assert_eq!(check_images_ready(&[variant_only]), Err(SaveBlocked::NoProductImages));
        let plain = ProductImage::create(p.id, ImageInput { image_url: "u".into(), ..Default::default() }, 0);
        assert_eq!(check_images_ready(&[plain]), Err(SaveBlocked::NoMainImage));
    }
}
