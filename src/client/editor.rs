//! Product form and its variant list.

use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::{ApiClient, ClientError};
use crate::domain::aggregates::product::{infer_attribute_schema, suggest_sku};
use crate::domain::aggregates::{AttributeSchema, Product, ProductInput, Variant, VariantInput};
use crate::domain::completion::{check_images_ready, CompletionStatus};

/// Create or edit form for one product.
pub struct ProductEditor {
    client: ApiClient,
    saved: Option<Product>,
    pub input: ProductInput,
}

impl ProductEditor {
    /// Empty form for a new product.
    pub fn create(client: ApiClient) -> Self { Self { client, saved: None, input: ProductInput::default() } }

    pub async fn open(client: ApiClient, id: Uuid) -> Result<Self, ClientError> {
        let product = client.admin_product(id).await?;
        Ok(Self { input: ProductInput::from(&product), saved: Some(product), client })
    }

    pub fn product(&self) -> Option<&Product> { self.saved.as_ref() }

    pub fn is_new(&self) -> bool { self.saved.is_none() }

    /// The form as it would be saved, with the stored variants and images.
    fn preview(&self) -> Product {
        let mut preview = match &self.saved {
            Some(saved) => saved.clone(),
            None => Product::create(ProductInput::default()),
        };
        preview.apply(self.input.clone());
        preview
    }

    pub fn completion(&self) -> CompletionStatus { CompletionStatus::evaluate(&self.preview()) }

    pub fn needs_variants_warning(&self) -> bool { self.preview().needs_variants() }

    /// Refreshes the stored images and variants after the managers changed them.
    pub async fn reload(&mut self) -> Result<(), ClientError> {
        if let Some(saved) = &self.saved {
            self.saved = Some(self.client.admin_product(saved.id).await?);
        }
        Ok(())
    }

    /// New products are saved without images; existing ones need a main
    /// product-level image first.
    pub async fn save(&mut self) -> Result<&Product, ClientError> {
        self.input.check()?;
        let product = match &self.saved {
            Some(saved) => {
                check_images_ready(&saved.images)?;
                self.client.update_product(saved.id, &self.input).await?
            }
            None => {
                let created = self.client.create_product(&self.input).await?;
                info!(product_id = %created.id, "product created");
                created
            }
        };
        Ok(self.saved.insert(product))
    }
}

/// Variant list of one product.
pub struct VariantManager {
    client: ApiClient,
    product_id: Uuid,
    product_name: String,
    variants: Vec<Variant>,
}

impl VariantManager {
    pub async fn load(client: ApiClient, product: &Product) -> Result<Self, ClientError> {
        let variants = client.variants(product.id).await?;
        Ok(Self { client, product_id: product.id, product_name: product.name.clone(), variants })
    }

    pub fn variants(&self) -> &[Variant] { &self.variants }

    pub fn schema(&self) -> AttributeSchema { infer_attribute_schema(&self.variants) }

    pub fn suggest_sku(&self, attributes: &BTreeMap<String, String>) -> String {
        suggest_sku(&self.product_name, attributes, &self.variants)
    }

    pub async fn create(&mut self, input: VariantInput) -> Result<&Variant, ClientError> {
        input.check(&self.variants, None)?;
        let variant = self.client.create_variant(self.product_id, &input).await?;
        self.variants.push(variant);
        Ok(&self.variants[self.variants.len() - 1])
    }

    pub async fn update(&mut self, id: Uuid, input: VariantInput) -> Result<&Variant, ClientError> {
        let idx = self.position(id)?;
        input.check(&self.variants, Some(id))?;
        let variant = self.client.update_variant(self.product_id, id, &input).await?;
        self.variants[idx] = variant;
        Ok(&self.variants[idx])
    }

    /// Returns `false` when `confirm` declines. There is no undo.
    pub async fn delete(&mut self, id: Uuid, confirm: impl FnOnce(&Variant) -> bool) -> Result<bool, ClientError> {
        let idx = self.position(id)?;
        if !confirm(&self.variants[idx]) { return Ok(false); }
        self.client.delete_variant(self.product_id, id).await?;
        self.variants.remove(idx);
        Ok(true)
    }

    fn position(&self, id: Uuid) -> Result<usize, ClientError> {
        self.variants.iter().position(|v| v.id == id).ok_or_else(|| ClientError::Blocked("Variant not found".into()))
    }
}
