//! OpenSASE Storefront
//!
//! Storefront and admin back-office for a cash-on-delivery shop.
//!
//! ## Features
//! - Product catalog with variants and images
//! - Cart, checkout and order tracking
//! - Order status workflow with customer cancellation
//! - Discount codes and loyalty points
//! - Admin users, statistics and dashboards
//! - Typed client with session handling and optimistic edits

use thiserror::Error;

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod store;

pub use config::Config;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient inventory for {sku}")]
    InsufficientInventory { sku: String },

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<sqlx::Error> for EcommerceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
            other => Self::StorageError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
