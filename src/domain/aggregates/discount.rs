//! Discount codes

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::FieldErrors;

pub const CODE_LEN: usize = 5;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MAX_USAGE_LIMIT: i32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Fixed }

impl DiscountType {
    pub fn as_str(self) -> &'static str { match self { Self::Percentage => "percentage", Self::Fixed => "fixed" } }
}

impl FromStr for DiscountType {
    type Err = DiscountError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(DiscountError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub usage_limit: i32,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn create(input: NewDiscount) -> Result<Self, FieldErrors> {
        input.check()?;
        Ok(Self {
            code: input.code.trim().to_uppercase(), discount_type: input.discount_type, discount_value: input.discount_value,
            usage_limit: input.usage_limit, used_count: 0, is_active: true, created_at: Utc::now(),
        })
    }

    /// Codes that were redeemed at least once are kept for bookkeeping.
    pub fn can_delete(&self) -> bool { self.used_count == 0 }

    pub fn remaining_uses(&self) -> i32 { (self.usage_limit - self.used_count).max(0) }

    pub fn ensure_redeemable(&self) -> Result<(), DiscountError> {
        if !self.is_active { return Err(DiscountError::Inactive(self.code.clone())); }
        if self.remaining_uses() == 0 { return Err(DiscountError::Exhausted(self.code.clone())); }
        Ok(())
    }

    /// Amount taken off `subtotal`; never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: i64) -> i64 {
        let amount = match self.discount_type {
            DiscountType::Percentage => subtotal * self.discount_value / 100,
            DiscountType::Fixed => self.discount_value,
        };
        amount.clamp(0, subtotal.max(0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscount {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub usage_limit: i32,
}

impl NewDiscount {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let code = self.code.trim();
        if code.chars().count() != CODE_LEN {
            errors.add("code", format!("Code must be exactly {CODE_LEN} characters"));
        } else if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.add("code", "Code may only contain letters and digits");
        }
        match self.discount_type {
            DiscountType::Percentage if !(1..=100).contains(&self.discount_value) => {
                errors.add("discountValue", "Percentage must be between 1 and 100");
            }
            DiscountType::Fixed if self.discount_value <= 0 => {
                errors.add("discountValue", "Discount amount must be greater than 0");
            }
            _ => {}
        }
        if !(1..=MAX_USAGE_LIMIT).contains(&self.usage_limit) {
            errors.add("usageLimit", format!("Usage limit must be between 1 and {MAX_USAGE_LIMIT}"));
        }
        errors.into_result()
    }
}

/// Random code from `A-Z0-9`.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN).map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountError {
    #[error("Discount code {0} is not active")]
    Inactive(String),
    #[error("Discount code {0} has reached its usage limit")]
    Exhausted(String),
    #[error("Discount code {0} has already been used and cannot be deleted")]
    InUse(String),
    #[error("Unknown discount type: {0}")]
    UnknownType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(code: &str, t: DiscountType, value: i64, limit: i32) -> NewDiscount {
        NewDiscount { code: code.into(), discount_type: t, discount_value: value, usage_limit: limit }
    }

    #[test]
    fn test_percentage_over_100_rejected() {
        let errs = new("AB12C", DiscountType::Percentage, 150, 5).check().unwrap_err();
        assert_eq!(errs.get("discountValue"), Some("Percentage must be between 1 and 100"));
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn test_code_and_limit_bounds() {
        let errs = new("AB12", DiscountType::Fixed, 10_000, 11).check().unwrap_err();
        assert!(errs.contains("code"));
        assert!(errs.contains("usageLimit"));
        assert!(new("AB-12", DiscountType::Fixed, 1, 1).check().unwrap_err().contains("code"));
        assert!(new("ab12c", DiscountType::Percentage, 100, 10).check().is_ok());
    }

    #[test]
    fn test_generated_codes_are_valid() {
        for _ in 0..50 {
            let code = generate_code();
            assert!(new(&code, DiscountType::Percentage, 10, 1).check().is_ok(), "{code}");
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_discount_amounts_and_redemption() {
        let mut pct = DiscountCode::create(new("save1", DiscountType::Percentage, 15, 1)).unwrap();
        assert_eq!(pct.code, "SAVE1");
        assert_eq!(pct.discount_for(200_000), 30_000);
        let fixed = DiscountCode::create(new("FLAT5", DiscountType::Fixed, 50_000, 2)).unwrap();
        assert_eq!(fixed.discount_for(20_000), 20_000);
        assert!(pct.ensure_redeemable().is_ok());
        pct.used_count = 1;
        assert!(!pct.can_delete());
        assert_eq!(pct.ensure_redeemable(), Err(DiscountError::Exhausted("SAVE1".into())));
    }
}
