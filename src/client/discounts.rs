//! Discount code management.

use tracing::info;

use super::{ApiClient, ClientError};
use crate::domain::aggregates::discount::generate_code;
use crate::domain::aggregates::{DiscountCode, DiscountError, NewDiscount};

pub struct DiscountManager {
    client: ApiClient,
    codes: Vec<DiscountCode>,
}

impl DiscountManager {
    pub async fn load(client: ApiClient) -> Result<Self, ClientError> {
        let codes = client.discounts().await?;
        Ok(Self { client, codes })
    }

    pub fn codes(&self) -> &[DiscountCode] { &self.codes }

    pub fn generate_code(&self) -> String {
        loop {
            let code = generate_code();
            if !self.codes.iter().any(|c| c.code == code) { return code; }
        }
    }

    /// Nothing is sent when the form has field errors.
    pub async fn create(&mut self, input: NewDiscount) -> Result<&DiscountCode, ClientError> {
        input.check()?;
        let created = self.client.create_discount(&input).await?;
        info!(code = %created.code, "discount code created");
        self.codes.push(created);
        Ok(&self.codes[self.codes.len() - 1])
    }

    pub async fn toggle(&mut self, code: &str) -> Result<&DiscountCode, ClientError> {
        let idx = self.position(code)?;
        let updated = self.client.set_discount_active(code, !self.codes[idx].is_active).await?;
        self.codes[idx] = updated;
        Ok(&self.codes[idx])
    }

    /// Codes that were redeemed stay. Returns `false` when `confirm` declines.
    pub async fn delete(&mut self, code: &str, confirm: impl FnOnce(&DiscountCode) -> bool) -> Result<bool, ClientError> {
        let idx = self.position(code)?;
        let discount = &self.codes[idx];
        if !discount.can_delete() {
            return Err(ClientError::Blocked(DiscountError::InUse(discount.code.clone()).to_string()));
        }
        if !confirm(discount) { return Ok(false); }
        self.client.delete_discount(code).await?;
        self.codes.remove(idx);
        Ok(true)
    }

    fn position(&self, code: &str) -> Result<usize, ClientError> {
        self.codes.iter().position(|c| c.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| ClientError::Blocked(format!("Discount code {code} not found")))
    }
}
