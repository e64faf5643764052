//! Domain model
//!
//! Aggregates hold the rules the storefront and the admin console share:
//! the order status machine, variant and image invariants, discount codes.
//! Everything here is synchronous and free of I/O so both the REST service
//! and the client can run the same checks.

pub mod aggregates;
pub mod completion;
pub mod events;
pub mod value_objects;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field-level validation failures, keyed by the camelCase field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self { Self::default() }

    /// Records a failure; the first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> { self.0.get(field).map(String::as_str) }
    pub fn contains(&self, field: &str) -> bool { self.0.contains_key(field) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> { self.0.iter().map(|(k, v)| (k.as_str(), v.as_str())) }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 { self.add(field, message); }
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, list) in errors.field_errors() {
            if let Some(first) = list.first() {
                let message = first.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| first.code.to_string());
                out.add(to_camel_case(field), message);
            }
        }
        out
    }
}

fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' { upper = true; continue; }
        if upper { out.extend(c.to_uppercase()); upper = false; } else { out.push(c); }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
        usage_limit: i32,
    }

    #[test]
    fn test_validator_errors_use_camel_case_keys() {
        let errs: FieldErrors = Sample { usage_limit: 0 }.validate().unwrap_err().into();
        assert_eq!(errs.get("usageLimit"), Some("Usage limit must be at least 1"));
    }

    #[test]
    fn test_first_message_wins() {
        let mut errs = FieldErrors::new();
        errs.add("sku", "SKU is required");
        errs.add("sku", "SKU already exists");
        assert_eq!(errs.get("sku"), Some("SKU is required"));
        assert_eq!(errs.to_string(), "sku: SKU is required");
    }
}
