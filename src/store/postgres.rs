//! Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    BestSeller, OrderFilter, OrderStatistics, Page, ProductFilter, RevenuePoint, Store, UserFilter, UserStatistics,
};
use crate::auth::{PasswordReset, Session};
use crate::domain::aggregates::{
    Category, DiscountCode, LineItem, Order, OrderStatus, Product, ProductFlags, ProductImage, ShippingAddress,
    StatusEntry, User, Variant,
};
use crate::domain::value_objects::{Email, Sku};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| EcommerceError::StorageError(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    async fn attach_children(&self, mut products: Vec<Product>) -> Result<Vec<Product>> {
        if products.is_empty() { return Ok(products); }
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let variants = sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY id")
            .bind(&ids).fetch_all(&self.pool).await?;
        let images = sqlx::query_as::<_, ImageRow>("SELECT * FROM product_images WHERE product_id = ANY($1) ORDER BY sort_order, created_at")
            .bind(&ids).fetch_all(&self.pool).await?;
        let mut variants_by: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for row in variants { let v = Variant::try_from(row)?; variants_by.entry(v.product_id).or_default().push(v); }
        let mut images_by: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
        for row in images { let i = ProductImage::from(row); images_by.entry(i.product_id).or_default().push(i); }
        for p in &mut products {
            p.variants = variants_by.remove(&p.id).unwrap_or_default();
            p.images = images_by.remove(&p.id).unwrap_or_default();
        }
        Ok(products)
    }

    async fn attach_history(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let history = sqlx::query_as::<_, HistoryRow>(
            "SELECT order_id, status, note, created_at FROM order_status_history WHERE order_id = ANY($1) ORDER BY created_at DESC, id DESC",
        ).bind(&ids).fetch_all(&self.pool).await?;
        let mut by_order: HashMap<Uuid, Vec<StatusEntry>> = HashMap::new();
        for h in history {
            let status: OrderStatus = h.status.parse().map_err(corrupt)?;
            by_order.entry(h.order_id).or_default().push(StatusEntry { status, note: h.note, created_at: h.created_at });
        }
        rows.into_iter().map(|r| {
            let history = by_order.remove(&r.id).unwrap_or_default();
            r.into_order(history)
        }).collect()
    }
}

fn corrupt(e: impl std::fmt::Display) -> EcommerceError { EcommerceError::StorageError(format!("corrupt row: {e}")) }

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, full_name: String, email: String, role: String, status: String, phone_number: Option<String>,
    loyalty_points: i64, password_hash: String, created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = EcommerceError;
    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id, full_name: r.full_name, email: Email::parse(r.email).map_err(corrupt)?,
            role: r.role.parse().map_err(corrupt)?, status: r.status.parse().map_err(corrupt)?,
            phone_number: r.phone_number, loyalty_points: r.loyalty_points, password_hash: r.password_hash, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow { token: String, user_id: Uuid, expires_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, parent_id: Option<Uuid>, description: Option<String> }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, brand: Option<String>, description: String, short_description: Option<String>, base_price: i64,
    category_ids: Vec<Uuid>, tags: Vec<String>, is_active: bool, is_featured: bool, is_new_product: bool, is_best_seller: bool,
    has_variants: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id, name: r.name, brand: r.brand, description: r.description, short_description: r.short_description,
            base_price: r.base_price, category_ids: r.category_ids, tags: r.tags,
            flags: ProductFlags { is_active: r.is_active, is_featured: r.is_featured, is_new_product: r.is_new_product, is_best_seller: r.is_best_seller },
            has_variants: r.has_variants, variants: vec![], images: vec![], created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid, product_id: Uuid, sku: String, name: String, price: i64, sale_price: Option<i64>, inventory: i32,
    is_active: bool, attributes: Json<BTreeMap<String, String>>,
}

impl TryFrom<VariantRow> for Variant {
    type Error = EcommerceError;
    fn try_from(r: VariantRow) -> Result<Self> {
        Ok(Variant {
            id: r.id, product_id: r.product_id, sku: Sku::new(r.sku).map_err(corrupt)?, name: r.name, price: r.price,
            sale_price: r.sale_price, inventory: r.inventory, is_active: r.is_active, attributes: r.attributes.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, image_url: String, alt: String, is_main: bool, sort_order: i32,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for ProductImage {
    fn from(r: ImageRow) -> Self {
        ProductImage {
            id: r.id, product_id: r.product_id, image_url: r.image_url, alt: r.alt, is_main: r.is_main,
            variant_id: r.variant_id, sort_order: r.sort_order, created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, items: Json<Vec<LineItem>>, subtotal: i64, shipping_fee: i64, tax: i64,
    discount_amount: i64, discount_code: Option<String>, loyalty_points_used: i64, loyalty_points_earned: i64, total: i64,
    shipping_address: Json<ShippingAddress>, payment_status: String, note: Option<String>, created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, status_history: Vec<StatusEntry>) -> Result<Order> {
        Ok(Order {
            id: self.id, order_number: self.order_number, user_id: self.user_id, items: self.items.0, subtotal: self.subtotal,
            shipping_fee: self.shipping_fee, tax: self.tax, discount_amount: self.discount_amount, discount_code: self.discount_code,
            loyalty_points_used: self.loyalty_points_used, loyalty_points_earned: self.loyalty_points_earned, total: self.total,
            shipping_address: self.shipping_address.0, payment_method: Default::default(),
            payment_status: self.payment_status.parse().map_err(corrupt)?, note: self.note, status_history, created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow { order_id: Uuid, status: String, note: Option<String>, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct DiscountRow {
    code: String, discount_type: String, discount_value: i64, usage_limit: i32, used_count: i32, is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = EcommerceError;
    fn try_from(r: DiscountRow) -> Result<Self> {
        Ok(DiscountCode {
            code: r.code, discount_type: r.discount_type.parse().map_err(corrupt)?, discount_value: r.discount_value,
            usage_limit: r.usage_limit, used_count: r.used_count, is_active: r.is_active, created_at: r.created_at,
        })
    }
}

fn like(search: &Option<String>) -> Option<String> {
    search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")))
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &UserFilter) {
    if let Some(role) = f.role { qb.push(" AND role = ").push_bind(role.as_str()); }
    if let Some(status) = f.status { qb.push(" AND status = ").push_bind(status.as_str()); }
    if let Some(pattern) = like(&f.search) {
        qb.push(" AND (full_name ILIKE ").push_bind(pattern.clone()).push(" OR email ILIKE ").push_bind(pattern).push(")");
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ProductFilter) {
    if let Some(active) = f.is_active { qb.push(" AND is_active = ").push_bind(active); }
    if let Some(category) = f.category_id { qb.push(" AND ").push_bind(category).push(" = ANY(category_ids)"); }
    if let Some(pattern) = like(&f.search) {
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone()).push(" OR brand ILIKE ").push_bind(pattern).push(")");
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &OrderFilter) {
    if let Some(user) = f.user_id { qb.push(" AND user_id = ").push_bind(user); }
    if let Some(status) = f.status { qb.push(" AND status = ").push_bind(status.as_str()); }
    if let Some(pattern) = like(&f.search) {
        qb.push(" AND (order_number ILIKE ").push_bind(pattern.clone())
            .push(" OR shipping_address->>'fullName' ILIKE ").push_bind(pattern).push(")");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, full_name, email, role, status, phone_number, loyalty_points, password_hash, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(user.id).bind(&user.full_name).bind(user.email.as_str()).bind(user.role.as_str()).bind(user.status.as_str())
            .bind(&user.phone_number).bind(user.loyalty_points).bind(&user.password_hash).bind(user.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1").bind(email.as_str())
            .fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Page<User>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_user_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");
        push_user_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(i64::from(filter.pagination.per_page))
            .push(" OFFSET ").push_bind(i64::from(filter.pagination.offset()));
        let rows: Vec<UserRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = rows.into_iter().map(User::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total, page: filter.pagination.page, per_page: filter.pagination.per_page })
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let done = sqlx::query("UPDATE users SET full_name = $2, role = $3, status = $4, phone_number = $5, password_hash = $6 WHERE id = $1")
            .bind(user.id).bind(&user.full_name).bind(user.role.as_str()).bind(user.status.as_str())
            .bind(&user.phone_number).bind(&user.password_hash)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::NotFound("User")); }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn adjust_loyalty_points(&self, user_id: Uuid, delta: i64) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar("UPDATE users SET loyalty_points = loyalty_points + $2 WHERE id = $1 AND loyalty_points + $2 >= 0 RETURNING loyalty_points")
            .bind(user_id).bind(delta).fetch_optional(&self.pool).await?;
        match balance {
            Some(b) => Ok(b),
            None => match self.user(user_id).await? {
                Some(u) => Err(EcommerceError::Conflict(format!("Only {} loyalty points available", u.loyalty_points))),
                None => Err(EcommerceError::NotFound("User")),
            },
        }
    }

    async fn user_statistics(&self) -> Result<UserStatistics> {
        let (total_users, active_users, inactive_users, admins, customers): (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'active'), COUNT(*) FILTER (WHERE status = 'inactive'), \
             COUNT(*) FILTER (WHERE role = 'admin'), COUNT(*) FILTER (WHERE role = 'customer') FROM users",
        ).fetch_one(&self.pool).await?;
        Ok(UserStatistics { total_users, active_users, inactive_users, admins, customers })
    }

    async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token).bind(session.user_id).bind(session.expires_at).execute(&self.pool).await?;
        Ok(())
    }

    async fn session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token = $1").bind(token).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| Session { token: r.token, user_id: r.user_id, expires_at: r.expires_at }))
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1").bind(token).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()> {
        sqlx::query("INSERT INTO password_resets (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&reset.token).bind(reset.user_id).bind(reset.expires_at).execute(&self.pool).await?;
        Ok(())
    }

    async fn take_password_reset(&self, token: &str) -> Result<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, SessionRow>("DELETE FROM password_resets WHERE token = $1 RETURNING token, user_id, expires_at")
            .bind(token).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| PasswordReset { token: r.token, user_id: r.user_id, expires_at: r.expires_at }))
    }

    async fn create_category(&self, category: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, parent_id, description) VALUES ($1, $2, $3, $4, $5)")
            .bind(category.id).bind(&category.name).bind(&category.slug).bind(category.parent_id).bind(&category.description)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| Category { id: r.id, name: r.name, slug: r.slug, parent_id: r.parent_id, description: r.description }).collect())
    }

    async fn create_product(&self, p: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, brand, description, short_description, base_price, category_ids, tags, is_active, is_featured, is_new_product, is_best_seller, has_variants, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)")
            .bind(p.id).bind(&p.name).bind(&p.brand).bind(&p.description).bind(&p.short_description).bind(p.base_price)
            .bind(&p.category_ids).bind(&p.tags).bind(p.flags.is_active).bind(p.flags.is_featured).bind(p.flags.is_new_product)
            .bind(p.flags.is_best_seller).bind(p.has_variants).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        Ok(self.attach_children(vec![row.into()]).await?.pop())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM products WHERE TRUE");
        push_product_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(i64::from(filter.pagination.per_page))
            .push(" OFFSET ").push_bind(i64::from(filter.pagination.offset()));
        let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = self.attach_children(rows.into_iter().map(Product::from).collect()).await?;
        Ok(Page { items, total, page: filter.pagination.page, per_page: filter.pagination.per_page })
    }

    async fn update_product(&self, p: &Product) -> Result<()> {
        let done = sqlx::query("UPDATE products SET name = $2, brand = $3, description = $4, short_description = $5, base_price = $6, category_ids = $7, tags = $8, is_active = $9, is_featured = $10, is_new_product = $11, is_best_seller = $12, has_variants = $13, updated_at = $14 WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(&p.brand).bind(&p.description).bind(&p.short_description).bind(p.base_price)
            .bind(&p.category_ids).bind(&p.tags).bind(p.flags.is_active).bind(p.flags.is_featured).bind(p.flags.is_new_product)
            .bind(p.flags.is_best_seller).bind(p.has_variants).bind(p.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::NotFound("Product")); }
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_variant(&self, v: &Variant) -> Result<()> {
        sqlx::query("INSERT INTO product_variants (id, product_id, sku, name, price, sale_price, inventory, is_active, attributes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(v.id).bind(v.product_id).bind(v.sku.as_str()).bind(&v.name).bind(v.price).bind(v.sale_price)
            .bind(v.inventory).bind(v.is_active).bind(Json(&v.attributes))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_variant(&self, v: &Variant) -> Result<()> {
        let done = sqlx::query("UPDATE product_variants SET sku = $2, name = $3, price = $4, sale_price = $5, inventory = $6, is_active = $7, attributes = $8 WHERE id = $1")
            .bind(v.id).bind(v.sku.as_str()).bind(&v.name).bind(v.price).bind(v.sale_price).bind(v.inventory)
            .bind(v.is_active).bind(Json(&v.attributes))
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::NotFound("Variant")); }
        Ok(())
    }

    async fn delete_variant(&self, product_id: Uuid, variant_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM product_variants WHERE id = $1 AND product_id = $2")
            .bind(variant_id).bind(product_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn variants(&self, product_id: Uuid) -> Result<Vec<Variant>> {
        sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = $1 ORDER BY id")
            .bind(product_id).fetch_all(&self.pool).await?
            .into_iter().map(Variant::try_from).collect()
    }

    async fn variant(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE id = $1")
            .bind(variant_id).fetch_optional(&self.pool).await?.map(Variant::try_from).transpose()
    }

    async fn adjust_inventory(&self, variant_id: Uuid, delta: i32) -> Result<i32> {
        let next: Option<i32> = sqlx::query_scalar("UPDATE product_variants SET inventory = inventory + $2 WHERE id = $1 AND inventory + $2 >= 0 RETURNING inventory")
            .bind(variant_id).bind(delta).fetch_optional(&self.pool).await?;
        match next {
            Some(n) => Ok(n),
            None => match self.variant(variant_id).await? {
                Some(v) => Err(EcommerceError::InsufficientInventory { sku: v.sku.to_string() }),
                None => Err(EcommerceError::NotFound("Variant")),
            },
        }
    }

    async fn create_image(&self, i: &ProductImage) -> Result<()> {
        sqlx::query("INSERT INTO product_images (id, product_id, variant_id, image_url, alt, is_main, sort_order, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(i.id).bind(i.product_id).bind(i.variant_id).bind(&i.image_url).bind(&i.alt).bind(i.is_main)
            .bind(i.sort_order).bind(i.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn images(&self, product_id: Uuid) -> Result<Vec<ProductImage>> {
        let rows = sqlx::query_as::<_, ImageRow>("SELECT * FROM product_images WHERE product_id = $1 ORDER BY sort_order, created_at")
            .bind(product_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ProductImage::from).collect())
    }

    async fn save_images(&self, product_id: Uuid, images: &[ProductImage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for image in images {
            let done = sqlx::query("UPDATE product_images SET alt = $3, is_main = $4, sort_order = $5 WHERE id = $1 AND product_id = $2")
                .bind(image.id).bind(product_id).bind(&image.alt).bind(image.is_main).bind(image.sort_order)
                .execute(&mut *tx).await?;
            if done.rows_affected() == 0 { return Err(EcommerceError::NotFound("Image")); }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM product_images WHERE id = $1 AND product_id = $2")
            .bind(image_id).bind(product_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_order(&self, o: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO orders (id, order_number, user_id, items, subtotal, shipping_fee, tax, discount_amount, discount_code, loyalty_points_used, loyalty_points_earned, total, shipping_address, payment_method, payment_status, note, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'cod', $14, $15, $16, $17)")
            .bind(o.id).bind(&o.order_number).bind(o.user_id).bind(Json(&o.items)).bind(o.subtotal).bind(o.shipping_fee)
            .bind(o.tax).bind(o.discount_amount).bind(&o.discount_code).bind(o.loyalty_points_used).bind(o.loyalty_points_earned)
            .bind(o.total).bind(Json(&o.shipping_address)).bind(o.payment_status.as_str()).bind(&o.note)
            .bind(o.status().as_str()).bind(o.created_at)
            .execute(&mut *tx).await?;
        for entry in o.status_history.iter().rev() {
            sqlx::query("INSERT INTO order_status_history (order_id, status, note, created_at) VALUES ($1, $2, $3, $4)")
                .bind(o.id).bind(entry.status.as_str()).bind(&entry.note).bind(entry.created_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_all(&self.pool).await?;
        Ok(self.attach_history(rows).await?.pop())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        push_order_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(i64::from(filter.pagination.per_page))
            .push(" OFFSET ").push_bind(i64::from(filter.pagination.offset()));
        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = self.attach_history(rows).await?;
        Ok(Page { items, total, page: filter.pagination.page, per_page: filter.pagination.per_page })
    }

    async fn save_order_status(&self, o: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query("UPDATE orders SET payment_status = $2, status = $3 WHERE id = $1 AND status = $4")
            .bind(o.id).bind(o.payment_status.as_str()).bind(o.status().as_str()).bind(expected.as_str())
            .execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1").bind(o.id).fetch_optional(&mut *tx).await?;
            return Err(match current {
                Some((status,)) => EcommerceError::Conflict(format!("Order {} is already {status}", o.order_number)),
                None => EcommerceError::NotFound("Order"),
            });
        }
        sqlx::query("DELETE FROM order_status_history WHERE order_id = $1").bind(o.id).execute(&mut *tx).await?;
        for entry in o.status_history.iter().rev() {
            sqlx::query("INSERT INTO order_status_history (order_id, status, note, created_at) VALUES ($1, $2, $3, $4)")
                .bind(o.id).bind(entry.status.as_str()).bind(&entry.note).bind(entry.created_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order_statistics(&self) -> Result<OrderStatistics> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as("SELECT status, COUNT(*), COALESCE(SUM(total), 0)::BIGINT FROM orders GROUP BY status")
            .fetch_all(&self.pool).await?;
        let mut stats = OrderStatistics::default();
        for status in OrderStatus::ALL { stats.by_status.insert(status.as_str().to_string(), 0); }
        for (status, count, revenue) in rows {
            stats.total_orders += count;
            if status == OrderStatus::Delivered.as_str() { stats.total_revenue = revenue; }
            if status == OrderStatus::Pending.as_str() { stats.pending_orders = count; }
            stats.by_status.insert(status, count);
        }
        Ok(stats)
    }

    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<RevenuePoint>> {
        let rows: Vec<(NaiveDate, i64, i64)> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, COALESCE(SUM(total), 0)::BIGINT, COUNT(*) FROM orders \
             WHERE created_at >= $1 AND status <> 'cancelled' GROUP BY day ORDER BY day",
        ).bind(since).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(date, revenue, orders)| RevenuePoint { date, revenue, orders }).collect())
    }

    async fn best_sellers(&self, limit: u32) -> Result<Vec<BestSeller>> {
        let rows: Vec<(Uuid, String, i64, i64)> = sqlx::query_as(
            "SELECT (item->>'productId')::UUID AS product_id, COALESCE(MAX(item->>'productName'), ''), \
             COALESCE(SUM((item->>'quantity')::BIGINT), 0)::BIGINT AS sold, COALESCE(SUM((item->>'totalPrice')::BIGINT), 0)::BIGINT \
             FROM orders, jsonb_array_elements(items) AS item WHERE status <> 'cancelled' \
             GROUP BY product_id ORDER BY sold DESC LIMIT $1",
        ).bind(i64::from(limit)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(product_id, product_name, quantity_sold, revenue)| BestSeller { product_id, product_name, quantity_sold, revenue }).collect())
    }

    async fn create_discount(&self, d: &DiscountCode) -> Result<()> {
        sqlx::query("INSERT INTO discount_codes (code, discount_type, discount_value, usage_limit, used_count, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(&d.code).bind(d.discount_type.as_str()).bind(d.discount_value).bind(d.usage_limit).bind(d.used_count)
            .bind(d.is_active).bind(d.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn discount(&self, code: &str) -> Result<Option<DiscountCode>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes WHERE code = $1")
            .bind(code).fetch_optional(&self.pool).await?.map(DiscountCode::try_from).transpose()
    }

    async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?.into_iter().map(DiscountCode::try_from).collect()
    }

    async fn update_discount(&self, d: &DiscountCode) -> Result<()> {
        let done = sqlx::query("UPDATE discount_codes SET discount_type = $2, discount_value = $3, usage_limit = $4, is_active = $5 WHERE code = $1")
            .bind(&d.code).bind(d.discount_type.as_str()).bind(d.discount_value).bind(d.usage_limit).bind(d.is_active)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(EcommerceError::NotFound("Discount code")); }
        Ok(())
    }

    async fn delete_discount(&self, code: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM discount_codes WHERE code = $1 AND used_count = 0").bind(code).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn redeem_discount(&self, code: &str) -> Result<DiscountCode> {
        let row = sqlx::query_as::<_, DiscountRow>("UPDATE discount_codes SET used_count = used_count + 1 WHERE code = $1 AND is_active AND used_count < usage_limit RETURNING *")
            .bind(code).fetch_optional(&self.pool).await?;
        match row {
            Some(r) => DiscountCode::try_from(r),
            None => match self.discount(code).await? {
                Some(d) => Err(EcommerceError::Conflict(d.ensure_redeemable().err().map(|e| e.to_string()).unwrap_or_else(|| format!("Discount code {code} cannot be used")))),
                None => Err(EcommerceError::NotFound("Discount code")),
            },
        }
    }

    async fn release_discount(&self, code: &str) -> Result<()> {
        sqlx::query("UPDATE discount_codes SET used_count = GREATEST(used_count - 1, 0) WHERE code = $1").bind(code).execute(&self.pool).await?;
        Ok(())
    }
}
