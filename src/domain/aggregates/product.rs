//! Product Aggregate
//!
//! A product owns its variants and images. Variant attributes are an open
//! string map: the set of attribute names is whatever admins typed, so the
//! only structural rule is that every declared attribute carries a value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::image::ProductImage;
use crate::domain::value_objects::Sku;
use crate::domain::FieldErrors;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductFlags {
    pub is_active: bool,
    pub is_featured: bool,
    pub is_new_product: bool,
    pub is_best_seller: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub description: String,
    pub short_description: Option<String>,
    pub base_price: i64,
    pub category_ids: Vec<Uuid>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub flags: ProductFlags,
    pub has_variants: bool,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(input: ProductInput) -> Self {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), name: String::new(), brand: None, description: String::new(), short_description: None,
            base_price: 0, category_ids: vec![], tags: vec![], flags: ProductFlags::default(), has_variants: false,
            variants: vec![], images: vec![], created_at: now, updated_at: now,
        };
        product.apply(input);
        product
    }

    /// Overwrites the editable fields; variants and images are untouched.
    pub fn apply(&mut self, input: ProductInput) {
        self.name = input.name.trim().to_string();
        self.brand = input.brand.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());
        self.description = input.description;
        self.short_description = input.short_description.filter(|s| !s.trim().is_empty());
        self.base_price = input.base_price;
        self.category_ids = dedup(input.category_ids);
        self.tags = dedup(input.tags.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect());
        self.flags = input.flags;
        self.has_variants = input.has_variants;
        self.touch();
    }

    pub fn set_active(&mut self, active: bool) { self.flags.is_active = active; self.touch(); }

    pub fn needs_variants(&self) -> bool { self.has_variants && self.variants.is_empty() }

    pub fn variant(&self, id: Uuid) -> Option<&Variant> { self.variants.iter().find(|v| v.id == id) }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn dedup<T: Ord + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Editable product fields, as submitted by the product form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "Short description must be at most 500 characters"))]
    pub short_description: Option<String>,
    #[validate(range(min = 0, message = "Base price cannot be negative"))]
    pub base_price: i64,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub flags: ProductFlags,
    #[serde(default)]
    pub has_variants: bool,
}

impl ProductInput {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => e.into(),
        };
        if self.name.trim().is_empty() { errors.add("name", "Product name is required"); }
        errors.into_result()
    }
}

impl From<&Product> for ProductInput {
    fn from(p: &Product) -> Self {
        Self {
            name: p.name.clone(), brand: p.brand.clone(), description: p.description.clone(),
            short_description: p.short_description.clone(), base_price: p.base_price,
            category_ids: p.category_ids.clone(), tags: p.tags.clone(), flags: p.flags, has_variants: p.has_variants,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub inventory: i32,
    pub is_active: bool,
    pub attributes: BTreeMap<String, String>,
}

impl Variant {
    /// Builds a variant from input that already passed [`VariantInput::check`].
    pub fn from_input(product_id: Uuid, input: VariantInput) -> Result<Self, VariantError> {
        let mut variant = Self {
            id: Uuid::now_v7(), product_id, sku: Sku::new(input.sku.clone())?, name: String::new(),
            price: 0, sale_price: None, inventory: 0, is_active: true, attributes: BTreeMap::new(),
        };
        variant.apply(input)?;
        Ok(variant)
    }

    pub fn apply(&mut self, input: VariantInput) -> Result<(), VariantError> {
        self.sku = Sku::new(input.sku)?;
        self.name = input.name.trim().to_string();
        self.price = input.price;
        self.sale_price = input.sale_price;
        self.inventory = input.inventory;
        self.is_active = input.is_active;
        self.attributes = input.attributes.into_iter().map(|(k, v)| (k.trim().to_string(), v.trim().to_string())).collect();
        Ok(())
    }

    /// The price a customer pays right now.
    pub fn effective_price(&self) -> i64 { self.sale_price.unwrap_or(self.price) }
}

/// Variant form submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    pub sku: String,
    pub name: String,
    #[validate(range(min = 1, message = "Price must be greater than 0"))]
    pub price: i64,
    #[serde(default)]
    pub sale_price: Option<i64>,
    #[validate(range(min = 0, message = "Inventory cannot be negative"))]
    pub inventory: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_true() -> bool { true }

impl VariantInput {
    /// Validates the submission against the variants already known for the
    /// product. `editing` is the id of the variant being updated, if any.
    pub fn check(&self, existing: &[Variant], editing: Option<Uuid>) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() { errors.add("name", "Variant name is required"); }
        match Sku::new(self.sku.as_str()) {
            Err(e) => errors.add("sku", e.to_string()),
            Ok(sku) => {
                if existing.iter().any(|v| Some(v.id) != editing && v.sku == sku) {
                    errors.add("sku", "SKU already exists for this product");
                }
            }
        }
        if let Err(e) = self.validate() { errors.merge(e.into()); }
        if let Some(sale) = self.sale_price {
            if sale <= 0 {
                errors.add("salePrice", "Sale price must be greater than 0");
            } else if sale >= self.price {
                errors.add("salePrice", "Sale price must be lower than the regular price");
            }
        }
        for (name, value) in &self.attributes {
            if name.trim().is_empty() {
                errors.add("attributes", "Attribute names cannot be blank");
            } else if value.trim().is_empty() {
                errors.add(format!("attributes.{}", name.trim()), format!("A value for {} is required", name.trim()));
            }
        }
        errors.into_result()
    }
}

impl From<&Variant> for VariantInput {
    fn from(v: &Variant) -> Self {
        Self {
            sku: v.sku.to_string(), name: v.name.clone(), price: v.price, sale_price: v.sale_price,
            inventory: v.inventory, is_active: v.is_active, attributes: v.attributes.clone(),
        }
    }
}

/// Attribute names seen across a product's variants with their known values.
pub type AttributeSchema = BTreeMap<String, BTreeSet<String>>;

pub fn infer_attribute_schema(variants: &[Variant]) -> AttributeSchema {
    let mut schema = AttributeSchema::new();
    for variant in variants {
        for (name, value) in &variant.attributes {
            let values = schema.entry(name.clone()).or_default();
            if !value.is_empty() { values.insert(value.clone()); }
        }
    }
    schema
}

/// Proposes a SKU such as `TSH-RED-XL` that is not taken yet. The server
/// still has the final say on uniqueness.
pub fn suggest_sku(product_name: &str, attributes: &BTreeMap<String, String>, existing: &[Variant]) -> String {
    let mut parts = vec![sku_fragment(product_name, 3).unwrap_or_else(|| "SKU".to_string())];
    parts.extend(attributes.values().filter_map(|v| sku_fragment(v, 3)));
    let base = parts.join("-");
    let taken = |candidate: &str| existing.iter().any(|v| v.sku.as_str() == candidate);
    if !taken(&base) { return base; }
    (2..).map(|n| format!("{base}-{n:02}")).find(|c| !taken(c)).unwrap_or_else(|| base.clone())
}

fn sku_fragment(text: &str, len: usize) -> Option<String> {
    let fragment: String = text.chars().filter(|c| c.is_ascii_alphanumeric()).take(len).collect::<String>().to_uppercase();
    if fragment.is_empty() { None } else { Some(fragment) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
}

impl Category {
    pub fn create(name: &str, parent_id: Option<Uuid>, description: Option<String>) -> Self {
        let slug = name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
        Self { id: Uuid::now_v7(), name: name.trim().to_string(), slug, parent_id, description }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariantError {
    #[error(transparent)]
    Sku(#[from] crate::domain::value_objects::SkuError),
    #[error("Variant not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn input(sku: &str, price: i64, sale: Option<i64>) -> VariantInput {
        VariantInput { sku: sku.into(), name: "Red / XL".into(), price, sale_price: sale, inventory: 5, is_active: true, attributes: attrs(&[("color", "red")]) }
    }

    fn variant(sku: &str) -> Variant {
        Variant::from_input(Uuid::nil(), input(sku, 100, None)).unwrap()
    }

    #[test]
    fn test_sale_price_bounds() {
        assert!(input("A1", 100, Some(99)).check(&[], None).is_ok());
        let errs = input("A1", 100, Some(100)).check(&[], None).unwrap_err();
        assert_eq!(errs.get("salePrice"), Some("Sale price must be lower than the regular price"));
        let errs = input("A1", 100, Some(0)).check(&[], None).unwrap_err();
        assert_eq!(errs.get("salePrice"), Some("Sale price must be greater than 0"));
    }

    #[test]
    fn test_required_fields_and_inventory() {
        let mut bad = input("", 0, None);
        bad.name = " ".into();
        bad.inventory = -1;
        let errs = bad.check(&[], None).unwrap_err();
        assert!(errs.contains("sku"));
        assert!(errs.contains("name"));
        assert!(errs.contains("price"));
        assert_eq!(errs.get("inventory"), Some("Inventory cannot be negative"));
    }

    #[test]
    fn test_sku_unique_among_other_variants() {
        let existing = vec![variant("TSH-RED")];
        let errs = input("tsh-red", 100, None).check(&existing, None).unwrap_err();
        assert_eq!(errs.get("sku"), Some("SKU already exists for this product"));
        // Updating the same variant keeps its own SKU.
        assert!(input("TSH-RED", 100, None).check(&existing, Some(existing[0].id)).is_ok());
    }

    #[test]
    fn test_every_attribute_needs_a_value() {
        let mut i = input("A1", 100, None);
        i.attributes = attrs(&[("color", "red"), ("size", "  ")]);
        let errs = i.check(&[], None).unwrap_err();
        assert_eq!(errs.get("attributes.size"), Some("A value for size is required"));
        assert!(!errs.contains("attributes.color"));
    }

    #[test]
    fn test_attribute_schema_is_union_of_keys() {
        let mut a = variant("A");
        a.attributes = attrs(&[("color", "red"), ("size", "M")]);
        let mut b = variant("B");
        b.attributes = attrs(&[("color", "blue"), ("material", "cotton")]);
        let schema = infer_attribute_schema(&[a, b]);
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["color", "material", "size"]);
        assert_eq!(schema["color"].iter().collect::<Vec<_>>(), vec!["blue", "red"]);
    }

    #[test]
    fn test_suggest_sku_avoids_collisions() {
        let a = attrs(&[("color", "red"), ("size", "xl")]);
        assert_eq!(suggest_sku("T-shirt basic", &a, &[]), "TSH-RED-XL");
        let existing = vec![variant("TSH-RED-XL"), variant("TSH-RED-XL-02")];
        assert_eq!(suggest_sku("T-shirt basic", &a, &existing), "TSH-RED-XL-03");
    }

    #[test]
    fn test_product_input_requires_name() {
        let errs = ProductInput { name: "  ".into(), ..Default::default() }.check().unwrap_err();
        assert_eq!(errs.get("name"), Some("Product name is required"));
    }

    #[test]
    fn test_needs_variants() {
        let p = Product::create(ProductInput { name: "Mug".into(), has_variants: true, ..Default::default() });
        assert!(p.needs_variants());
    }
}
