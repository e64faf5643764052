//! Persistence
//!
//! [`Store`] is the only seam between request handlers and storage.
//! [`MemoryStore`] backs tests and database-less runs; [`PgStore`] is the
//! production backend. Counters that must not go negative (inventory,
//! discount usage, loyalty balance) are adjusted atomically by the store.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::{PasswordReset, Session};
use crate::domain::aggregates::{
    Category, DiscountCode, Order, OrderStatus, Product, ProductImage, Role, User, UserStatus, Variant,
};
use crate::domain::value_objects::Email;
use crate::Result;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination { pub page: u32, pub per_page: u32 }

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
    }
    pub fn offset(&self) -> u32 { (self.page - 1) * self.per_page }
}

impl Default for Pagination {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> { pub items: Vec<T>, pub total: i64, pub page: u32, pub per_page: u32 }

impl<T> Page<T> {
    /// Cuts one page out of an already filtered and sorted list.
    pub fn slice(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as i64;
        let items = all.into_iter().skip(pagination.offset() as usize).take(pagination.per_page as usize).collect();
        Self { items, total, page: pagination.page, per_page: pagination.per_page }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatistics {
    pub total_orders: i64,
    pub by_status: BTreeMap<String, i64>,
    /// Sum of delivered order totals.
    pub total_revenue: i64,
    pub pending_orders: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint { pub date: NaiveDate, pub revenue: i64, pub orders: i64 }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub admins: i64,
    pub customers: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSeller { pub product_id: Uuid, pub product_name: String, pub quantity_sold: i64, pub revenue: i64 }

/// Fills days without orders so charts get a continuous series.
pub fn fill_revenue_days(points: Vec<RevenuePoint>, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<RevenuePoint> {
    let by_day: BTreeMap<NaiveDate, RevenuePoint> = points.into_iter().map(|p| (p.date, p)).collect();
    let mut day = since.date_naive();
    let mut out = Vec::new();
    while day <= until.date_naive() {
        out.push(by_day.get(&day).cloned().unwrap_or(RevenuePoint { date: day, revenue: 0, orders: 0 }));
        match day.succ_opt() { Some(next) => day = next, None => break }
    }
    out
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn user(&self, id: Uuid) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>>;
    async fn list_users(&self, filter: &UserFilter) -> Result<Page<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn delete_user(&self, id: Uuid) -> Result<bool>;
    /// Returns the new balance; fails without changes if it would go negative.
    async fn adjust_loyalty_points(&self, user_id: Uuid, delta: i64) -> Result<i64>;
    async fn user_statistics(&self) -> Result<UserStatistics>;

    // sessions
    async fn create_session(&self, session: &Session) -> Result<()>;
    async fn session(&self, token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> Result<()>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<()>;
    async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()>;
    /// Removes and returns the reset so a token works once.
    async fn take_password_reset(&self, token: &str) -> Result<Option<PasswordReset>>;

    // catalog
    async fn create_category(&self, category: &Category) -> Result<()>;
    async fn categories(&self) -> Result<Vec<Category>>;
    async fn create_product(&self, product: &Product) -> Result<()>;
    /// The product with its variants and images.
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>>;
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn delete_product(&self, id: Uuid) -> Result<bool>;

    async fn create_variant(&self, variant: &Variant) -> Result<()>;
    async fn update_variant(&self, variant: &Variant) -> Result<()>;
    async fn delete_variant(&self, product_id: Uuid, variant_id: Uuid) -> Result<bool>;
    async fn variants(&self, product_id: Uuid) -> Result<Vec<Variant>>;
    async fn variant(&self, variant_id: Uuid) -> Result<Option<Variant>>;
    /// Returns the new inventory; fails without changes if it would go negative.
    async fn adjust_inventory(&self, variant_id: Uuid, delta: i32) -> Result<i32>;

    async fn create_image(&self, image: &ProductImage) -> Result<()>;
    /// Sorted by `sort_order`.
    async fn images(&self, product_id: Uuid) -> Result<Vec<ProductImage>>;
    /// Persists alt text, main flag and sort order of the given images.
    async fn save_images(&self, product_id: Uuid, images: &[ProductImage]) -> Result<()>;
    async fn delete_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool>;

    // orders
    async fn create_order(&self, order: &Order) -> Result<()>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>>;
    /// Persists payment status and the full status history, only while the
    /// stored order is still in `expected`. Otherwise fails with `Conflict`.
    async fn save_order_status(&self, order: &Order, expected: OrderStatus) -> Result<()>;
    async fn order_statistics(&self) -> Result<OrderStatistics>;
    /// Non-cancelled orders created at or after `since`, grouped by UTC day.
    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<RevenuePoint>>;
    async fn best_sellers(&self, limit: u32) -> Result<Vec<BestSeller>>;

    // discounts
    async fn create_discount(&self, discount: &DiscountCode) -> Result<()>;
    async fn discount(&self, code: &str) -> Result<Option<DiscountCode>>;
    async fn list_discounts(&self) -> Result<Vec<DiscountCode>>;
    /// Updates type, value, usage limit and active flag; `used_count` is left alone.
    async fn update_discount(&self, discount: &DiscountCode) -> Result<()>;
    /// Deletes the code only while it has never been used.
    async fn delete_discount(&self, code: &str) -> Result<bool>;
    /// Consumes one use if the code is active and not exhausted.
    async fn redeem_discount(&self, code: &str) -> Result<DiscountCode>;
    /// Gives back a use taken by [`Store::redeem_discount`].
    async fn release_discount(&self, code: &str) -> Result<()>;
}
