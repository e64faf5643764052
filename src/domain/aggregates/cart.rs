//! Cart Aggregate
//!
//! The cart lives on the shopper's side; the server only sees the checkout
//! request built from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::{CheckoutItem, CheckoutRequest, ShippingAddress};
use crate::domain::aggregates::product::{Product, Variant};
use crate::domain::value_objects::Quantity;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub name: String,
    pub variant_name: String,
    pub unit_price: i64,
    pub quantity: Quantity,
}

impl CartItem {
    pub fn for_variant(product: &Product, variant: &Variant, quantity: u32) -> Self {
        Self {
            product_id: product.id, variant_id: variant.id, name: product.name.clone(), variant_name: variant.name.clone(),
            unit_price: variant.effective_price(), quantity: Quantity::new(quantity),
        }
    }

    pub fn line_total(&self) -> i64 { self.unit_price * i64::from(self.quantity.value()) }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> i64 { self.items.iter().map(CartItem::line_total).sum() }

    pub fn add_item(&mut self, item: CartItem) {
        if item.quantity.is_zero() { return; }
        if let Some(existing) = self.items.iter_mut().find(|i| i.variant_id == item.variant_id) {
            existing.quantity = existing.quantity.add(item.quantity.value());
        } else {
            self.items.push(item);
        }
        self.touch();
    }

    /// Setting a quantity of zero removes the line.
    pub fn update_quantity(&mut self, variant_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.variant_id == variant_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.variant_id != variant_id); }
        else { item.quantity = Quantity::new(quantity); }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.variant_id != variant_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    pub fn to_checkout(
        &self,
        shipping_address: ShippingAddress,
        discount_code: Option<String>,
        loyalty_points_used: i64,
        note: Option<String>,
    ) -> Result<CheckoutRequest, CartError> {
        if self.is_empty() { return Err(CartError::Empty); }
        Ok(CheckoutRequest {
            items: self.items.iter().map(|i| CheckoutItem { variant_id: i.variant_id, quantity: i.quantity.value() as i32 }).collect(),
            shipping_address, discount_code, loyalty_points_used, note,
        })
    }

    fn touch(&mut self) { self.updated_at = Some(Utc::now()); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("Item not found in cart")]
    ItemNotFound,
    #[error("Cart is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(variant_id: Uuid, qty: u32, price: i64) -> CartItem {
        CartItem { product_id: Uuid::nil(), variant_id, name: "Widget".into(), variant_name: "Red".into(), unit_price: price, quantity: Quantity::new(qty) }
    }

    #[test]
    fn test_cart_operations() {
        let v = Uuid::now_v7();
        let mut cart = Cart::new();
        cart.add_item(item(v, 2, 10));
        assert_eq!(cart.subtotal(), 20);
        cart.add_item(item(v, 1, 10));
        assert_eq!(cart.items()[0].quantity.value(), 3); // Merged
        cart.add_item(item(Uuid::now_v7(), 1, 5));
        assert_eq!(cart.item_count(), 4);
        cart.update_quantity(v, 0).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.remove_item(v), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_checkout_requires_items() {
        let cart = Cart::new();
        assert_eq!(cart.to_checkout(ShippingAddress::default(), None, 0, None).unwrap_err(), CartError::Empty);
    }
}
