//! In-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BestSeller, OrderFilter, OrderStatistics, Page, ProductFilter, RevenuePoint, Store, UserFilter, UserStatistics,
};
use crate::auth::{PasswordReset, Session};
use crate::domain::aggregates::{
    Category, DiscountCode, Order, OrderStatus, Product, ProductImage, Role, User, UserStatus, Variant,
};
use crate::domain::value_objects::Email;
use crate::{EcommerceError, Result};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
    resets: HashMap<String, PasswordReset>,
    categories: Vec<Category>,
    /// Stored without variants and images; those live in their own maps.
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, Variant>,
    images: HashMap<Uuid, ProductImage>,
    orders: HashMap<Uuid, Order>,
    discounts: BTreeMap<String, DiscountCode>,
}

impl State {
    fn variants_of(&self, product_id: Uuid) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self.variants.values().filter(|v| v.product_id == product_id).cloned().collect();
        variants.sort_by_key(|v| v.id);
        variants
    }

    fn images_of(&self, product_id: Uuid) -> Vec<ProductImage> {
        let mut images: Vec<ProductImage> = self.images.values().filter(|i| i.product_id == product_id).cloned().collect();
        images.sort_by_key(|i| (i.sort_order, i.created_at));
        images
    }

    fn assemble(&self, product: &Product) -> Product {
        let mut product = product.clone();
        product.variants = self.variants_of(product.id);
        product.images = self.images_of(product.id);
        product
    }
}

fn matches_search(haystacks: &[&str], needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        None => true,
        Some(n) => {
            let n = n.to_lowercase();
            haystacks.iter().any(|h| h.to_lowercase().contains(&n))
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut s = self.state.write().await;
        if s.users.values().any(|u| u.email == user.email) {
            return Err(EcommerceError::Conflict(format!("Email {} is already registered", user.email)));
        }
        s.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>> {
        Ok(self.state.read().await.users.values().find(|u| &u.email == email).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Page<User>> {
        let s = self.state.read().await;
        let mut users: Vec<User> = s.users.values()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| filter.status.map_or(true, |st| u.status == st))
            .filter(|u| matches_search(&[&u.full_name, u.email.as_str()], &filter.search))
            .cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(users, filter.pagination))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut s = self.state.write().await;
        let slot = s.users.get_mut(&user.id).ok_or(EcommerceError::NotFound("User"))?;
        // the balance only moves through adjust_loyalty_points
        let loyalty_points = slot.loyalty_points;
        *slot = User { loyalty_points, ..user.clone() };
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        s.sessions.retain(|_, session| session.user_id != id);
        Ok(s.users.remove(&id).is_some())
    }

    async fn adjust_loyalty_points(&self, user_id: Uuid, delta: i64) -> Result<i64> {
        let mut s = self.state.write().await;
        let user = s.users.get_mut(&user_id).ok_or(EcommerceError::NotFound("User"))?;
        let balance = user.loyalty_points + delta;
        if balance < 0 {
            return Err(EcommerceError::Conflict(format!("Only {} loyalty points available", user.loyalty_points)));
        }
        user.loyalty_points = balance;
        Ok(balance)
    }

    async fn user_statistics(&self) -> Result<UserStatistics> {
        let s = self.state.read().await;
        let mut stats = UserStatistics { total_users: s.users.len() as i64, ..Default::default() };
        for user in s.users.values() {
            match user.status {
                UserStatus::Active => stats.active_users += 1,
                UserStatus::Inactive => stats.inactive_users += 1,
            }
            match user.role {
                Role::Admin => stats.admins += 1,
                Role::Customer => stats.customers += 1,
            }
        }
        Ok(stats)
    }

    async fn create_session(&self, session: &Session) -> Result<()> {
        self.state.write().await.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.state.read().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        self.state.write().await.sessions.remove(token);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<()> {
        self.state.write().await.sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()> {
        self.state.write().await.resets.insert(reset.token.clone(), reset.clone());
        Ok(())
    }

    async fn take_password_reset(&self, token: &str) -> Result<Option<PasswordReset>> {
        Ok(self.state.write().await.resets.remove(token))
    }

    async fn create_category(&self, category: &Category) -> Result<()> {
        let mut s = self.state.write().await;
        if s.categories.iter().any(|c| c.slug == category.slug) {
            return Err(EcommerceError::Conflict(format!("Category {} already exists", category.name)));
        }
        s.categories.push(category.clone());
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.state.read().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        let mut stored = product.clone();
        stored.variants.clear();
        stored.images.clear();
        self.state.write().await.products.insert(product.id, stored);
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let s = self.state.read().await;
        Ok(s.products.get(&id).map(|p| s.assemble(p)))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>> {
        let s = self.state.read().await;
        let mut products: Vec<Product> = s.products.values()
            .filter(|p| filter.is_active.map_or(true, |a| p.flags.is_active == a))
            .filter(|p| filter.category_id.map_or(true, |c| p.category_ids.contains(&c)))
            .filter(|p| matches_search(&[&p.name, p.brand.as_deref().unwrap_or_default()], &filter.search))
            .map(|p| s.assemble(p))
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(products, filter.pagination))
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut s = self.state.write().await;
        let slot = s.products.get_mut(&product.id).ok_or(EcommerceError::NotFound("Product"))?;
        let mut stored = product.clone();
        stored.variants.clear();
        stored.images.clear();
        *slot = stored;
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        s.variants.retain(|_, v| v.product_id != id);
        s.images.retain(|_, i| i.product_id != id);
        Ok(s.products.remove(&id).is_some())
    }

    async fn create_variant(&self, variant: &Variant) -> Result<()> {
        let mut s = self.state.write().await;
        if !s.products.contains_key(&variant.product_id) { return Err(EcommerceError::NotFound("Product")); }
        if s.variants.values().any(|v| v.product_id == variant.product_id && v.sku == variant.sku) {
            return Err(EcommerceError::Conflict(format!("SKU {} already exists for this product", variant.sku)));
        }
        s.variants.insert(variant.id, variant.clone());
        Ok(())
    }

    async fn update_variant(&self, variant: &Variant) -> Result<()> {
        let mut s = self.state.write().await;
        if s.variants.values().any(|v| v.product_id == variant.product_id && v.id != variant.id && v.sku == variant.sku) {
            return Err(EcommerceError::Conflict(format!("SKU {} already exists for this product", variant.sku)));
        }
        let slot = s.variants.get_mut(&variant.id).ok_or(EcommerceError::NotFound("Variant"))?;
        *slot = variant.clone();
        Ok(())
    }

    async fn delete_variant(&self, product_id: Uuid, variant_id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        if s.variants.get(&variant_id).map_or(true, |v| v.product_id != product_id) { return Ok(false); }
        s.variants.remove(&variant_id);
        s.images.retain(|_, i| i.variant_id != Some(variant_id));
        Ok(true)
    }

    async fn variants(&self, product_id: Uuid) -> Result<Vec<Variant>> {
        Ok(self.state.read().await.variants_of(product_id))
    }

    async fn variant(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        Ok(self.state.read().await.variants.get(&variant_id).cloned())
    }

    async fn adjust_inventory(&self, variant_id: Uuid, delta: i32) -> Result<i32> {
        let mut s = self.state.write().await;
        let variant = s.variants.get_mut(&variant_id).ok_or(EcommerceError::NotFound("Variant"))?;
        let next = variant.inventory + delta;
        if next < 0 { return Err(EcommerceError::InsufficientInventory { sku: variant.sku.to_string() }); }
        variant.inventory = next;
        Ok(next)
    }

    async fn create_image(&self, image: &ProductImage) -> Result<()> {
        let mut s = self.state.write().await;
        if !s.products.contains_key(&image.product_id) { return Err(EcommerceError::NotFound("Product")); }
        s.images.insert(image.id, image.clone());
        Ok(())
    }

    async fn images(&self, product_id: Uuid) -> Result<Vec<ProductImage>> {
        Ok(self.state.read().await.images_of(product_id))
    }

    async fn save_images(&self, product_id: Uuid, images: &[ProductImage]) -> Result<()> {
        let mut s = self.state.write().await;
        for image in images {
            match s.images.get_mut(&image.id) {
                Some(slot) if slot.product_id == product_id => {
                    slot.alt = image.alt.clone();
                    slot.is_main = image.is_main;
                    slot.sort_order = image.sort_order;
                }
                _ => return Err(EcommerceError::NotFound("Image")),
            }
        }
        Ok(())
    }

    async fn delete_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool> {
        let mut s = self.state.write().await;
        if s.images.get(&image_id).map_or(true, |i| i.product_id != product_id) { return Ok(false); }
        s.images.remove(&image_id);
        Ok(true)
    }

    async fn create_order(&self, order: &Order) -> Result<()> {
        self.state.write().await.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>> {
        let s = self.state.read().await;
        let mut orders: Vec<Order> = s.orders.values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .filter(|o| filter.status.map_or(true, |st| o.status() == st))
            .filter(|o| matches_search(&[&o.order_number, &o.shipping_address.full_name], &filter.search))
            .cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(orders, filter.pagination))
    }

    async fn save_order_status(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut s = self.state.write().await;
        let slot = s.orders.get_mut(&order.id).ok_or(EcommerceError::NotFound("Order"))?;
        if slot.status() != expected {
            return Err(EcommerceError::Conflict(format!("Order {} is already {}", slot.order_number, slot.status())));
        }
        slot.payment_status = order.payment_status;
        slot.status_history = order.status_history.clone();
        Ok(())
    }

    async fn order_statistics(&self) -> Result<OrderStatistics> {
        let s = self.state.read().await;
        let mut stats = OrderStatistics { total_orders: s.orders.len() as i64, ..Default::default() };
        for status in OrderStatus::ALL { stats.by_status.insert(status.as_str().to_string(), 0); }
        for order in s.orders.values() {
            let status = order.status();
            *stats.by_status.entry(status.as_str().to_string()).or_default() += 1;
            if status == OrderStatus::Delivered { stats.total_revenue += order.total; }
            if status == OrderStatus::Pending { stats.pending_orders += 1; }
        }
        Ok(stats)
    }

    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<RevenuePoint>> {
        let s = self.state.read().await;
        let mut days: BTreeMap<chrono::NaiveDate, RevenuePoint> = BTreeMap::new();
        for order in s.orders.values().filter(|o| o.created_at >= since && o.status() != OrderStatus::Cancelled) {
            let date = order.created_at.date_naive();
            let point = days.entry(date).or_insert(RevenuePoint { date, revenue: 0, orders: 0 });
            point.revenue += order.total;
            point.orders += 1;
        }
        Ok(days.into_values().collect())
    }

    async fn best_sellers(&self, limit: u32) -> Result<Vec<BestSeller>> {
        let s = self.state.read().await;
        let mut totals: HashMap<Uuid, BestSeller> = HashMap::new();
        for order in s.orders.values().filter(|o| o.status() != OrderStatus::Cancelled) {
            for item in &order.items {
                let entry = totals.entry(item.product_id).or_insert_with(|| BestSeller {
                    product_id: item.product_id, product_name: item.product_name.clone(), quantity_sold: 0, revenue: 0,
                });
                entry.quantity_sold += i64::from(item.quantity);
                entry.revenue += item.total_price;
            }
        }
        let mut sellers: Vec<BestSeller> = totals.into_values().collect();
        sellers.sort_by(|a, b| b.quantity_sold.cmp(&a.quantity_sold).then_with(|| a.product_name.cmp(&b.product_name)));
        sellers.truncate(limit as usize);
        Ok(sellers)
    }

    async fn create_discount(&self, discount: &DiscountCode) -> Result<()> {
        let mut s = self.state.write().await;
        if s.discounts.contains_key(&discount.code) {
            return Err(EcommerceError::Conflict(format!("Discount code {} already exists", discount.code)));
        }
        s.discounts.insert(discount.code.clone(), discount.clone());
        Ok(())
    }

    async fn discount(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.state.read().await.discounts.get(code).cloned())
    }

    async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        let mut discounts: Vec<DiscountCode> = self.state.read().await.discounts.values().cloned().collect();
        discounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(discounts)
    }

    async fn update_discount(&self, discount: &DiscountCode) -> Result<()> {
        let mut s = self.state.write().await;
        let slot = s.discounts.get_mut(&discount.code).ok_or(EcommerceError::NotFound("Discount code"))?;
        slot.discount_type = discount.discount_type;
        slot.discount_value = discount.discount_value;
        slot.usage_limit = discount.usage_limit;
        slot.is_active = discount.is_active;
        Ok(())
    }

    async fn delete_discount(&self, code: &str) -> Result<bool> {
        let mut s = self.state.write().await;
        if s.discounts.get(code).is_some_and(|d| d.used_count == 0) {
            s.discounts.remove(code);
            return Ok(true);
        }
        Ok(false)
    }

    async fn redeem_discount(&self, code: &str) -> Result<DiscountCode> {
        let mut s = self.state.write().await;
        let discount = s.discounts.get_mut(code).ok_or(EcommerceError::NotFound("Discount code"))?;
        discount.ensure_redeemable().map_err(|e| EcommerceError::Conflict(e.to_string()))?;
        discount.used_count += 1;
        Ok(discount.clone())
    }

    async fn release_discount(&self, code: &str) -> Result<()> {
        let mut s = self.state.write().await;
        if let Some(discount) = s.discounts.get_mut(code) {
            discount.used_count = (discount.used_count - 1).max(0);
        }
        Ok(())
    }
}
