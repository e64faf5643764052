//! Checkout, order tracking and the admin order workflow.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AdminUser, ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult, AppState, AuthUser};
use crate::domain::aggregates::{
    CheckoutRequest, LineItem, Order, OrderStatus, Product, StatusChange, StatusEntry, User,
};
use crate::domain::events::{DiscountEvent, DomainEvent, OrderEvent, ProductEvent};
use crate::store::{fill_revenue_days, OrderFilter, OrderStatistics, Page, Pagination, RevenuePoint, Store};
use crate::EcommerceError;

pub const DEFAULT_CHART_DAYS: i64 = 7;
pub const MAX_CHART_DAYS: i64 = 90;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(my_orders).post(checkout))
        .route("/orders/user", get(my_orders))
        .route("/orders/user/:id", get(my_order))
        .route("/orders/user/:id/tracking", get(tracking))
        .route("/orders/user/:id/cancel", post(cancel))
        .route("/admin/orders", get(admin_orders))
        .route("/admin/orders/statistics", get(statistics))
        .route("/admin/orders/revenue-chart", get(revenue_chart))
        .route("/admin/orders/:id", get(admin_order))
        .route("/admin/orders/:id/status", patch(update_status))
}

/// `ORD-YYYYMMDD-XXXXXX`
pub fn order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{:06}", now.format("%Y%m%d"), rand::thread_rng().gen_range(0..1_000_000))
}

// =============================================================================
// Checkout
// =============================================================================

/// Stock, discount uses and loyalty points taken for an order that is not
/// persisted yet.
#[derive(Default)]
struct Reservation {
    inventory: Vec<(Uuid, i32)>,
    discount: Option<String>,
    points: Option<(Uuid, i64)>,
}

impl Reservation {
    async fn release(self, store: &dyn Store) {
        for (variant_id, quantity) in self.inventory {
            if let Err(e) = store.adjust_inventory(variant_id, quantity).await {
                warn!(%variant_id, error = %e, "failed to restore reserved inventory");
            }
        }
        if let Some(code) = self.discount {
            if let Err(e) = store.release_discount(&code).await {
                warn!(%code, error = %e, "failed to release discount use");
            }
        }
        if let Some((user_id, points)) = self.points {
            if let Err(e) = store.adjust_loyalty_points(user_id, points).await {
                warn!(%user_id, error = %e, "failed to refund loyalty points");
            }
        }
    }
}

async fn checkout(State(state): State<AppState>, auth: AuthUser, ApiJson(req): ApiJson<CheckoutRequest>) -> Result<(StatusCode, ApiResponse<Order>), ApiError> {
    req.check()?;
    let user = auth.user;
    if req.loyalty_points_used > user.loyalty_points {
        return Err(ApiError::field("loyaltyPointsUsed", format!("Only {} loyalty points available", user.loyalty_points)));
    }

    let mut products: HashMap<Uuid, Product> = HashMap::new();
    let mut items = Vec::with_capacity(req.items.len());
    for (idx, wanted) in req.items.iter().enumerate() {
        let missing = || ApiError::field(&format!("items[{idx}].variantId"), "This item is no longer available");
        let variant = state.store.variant(wanted.variant_id).await?.filter(|v| v.is_active).ok_or_else(missing)?;
        if !products.contains_key(&variant.product_id) {
            let product = state.store.product(variant.product_id).await?.ok_or_else(missing)?;
            products.insert(product.id, product);
        }
        let product = products.get(&variant.product_id).filter(|p| p.flags.is_active).ok_or_else(missing)?;
        let price = variant.effective_price();
        items.push(LineItem {
            product_id: product.id, variant_id: variant.id, product_name: product.name.clone(), variant_name: variant.name.clone(),
            sku: variant.sku.to_string(), price, quantity: wanted.quantity, total_price: LineItem::line_total(price, wanted.quantity),
        });
    }

    let mut reservation = Reservation::default();
    match place(&state, &user, req, items, &mut reservation).await {
        Ok(order) => {
            info!(order_id = %order.id, order_number = %order.order_number, total = order.total, "order placed");
            for item in &order.items {
                state.events.publish(DomainEvent::Product(ProductEvent::InventoryAdjusted { variant_id: item.variant_id, delta: -item.quantity })).await;
            }
            if let Some(code) = &order.discount_code {
                state.events.publish(DomainEvent::Discount(DiscountEvent::Redeemed { code: code.clone(), order_id: order.id })).await;
            }
            state.events.publish(DomainEvent::Order(OrderEvent::Placed {
                order_id: order.id, order_number: order.order_number.clone(), user_id: order.user_id, total: order.total,
            })).await;
            Ok((StatusCode::CREATED, ApiResponse::with_message(order, "Order placed successfully")))
        }
        Err(e) => {
            reservation.release(state.store.as_ref()).await;
            Err(e)
        }
    }
}

async fn place(state: &AppState, user: &User, req: CheckoutRequest, items: Vec<LineItem>, reservation: &mut Reservation) -> Result<Order, ApiError> {
    for item in &items {
        state.store.adjust_inventory(item.variant_id, -item.quantity).await?;
        reservation.inventory.push((item.variant_id, item.quantity));
    }
    let subtotal: i64 = items.iter().map(|i| i.total_price).sum();

    let mut discount_amount = 0;
    let discount_code = req.discount_code.as_deref().map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty());
    if let Some(code) = &discount_code {
        let discount = match state.store.redeem_discount(code).await {
            Ok(d) => d,
            Err(EcommerceError::NotFound(_)) => return Err(ApiError::field("discountCode", "Discount code not found")),
            Err(EcommerceError::Conflict(msg)) => return Err(ApiError::field("discountCode", msg)),
            Err(e) => return Err(e.into()),
        };
        reservation.discount = Some(code.clone());
        discount_amount = discount.discount_for(subtotal);
    }

    if req.loyalty_points_used > 0 {
        state.store.adjust_loyalty_points(user.id, -req.loyalty_points_used).await?;
        reservation.points = Some((user.id, req.loyalty_points_used));
    }

    let totals = state.config.pricing.price(subtotal, discount_amount, req.loyalty_points_used);
    let order = Order::place(
        order_number(Utc::now()), user.id, items, totals, discount_code, req.loyalty_points_used, req.shipping_address, req.note,
    )?;
    state.store.create_order(&order).await?;
    Ok(order)
}

// =============================================================================
// Status side effects
// =============================================================================

/// Loyalty credit on delivery; stock and points come back on cancellation.
/// The status change is already persisted, so failures are only logged.
async fn apply_side_effects(store: &dyn Store, order: &Order, change: StatusChange) {
    match change.to {
        OrderStatus::Delivered if order.loyalty_points_earned > 0 => {
            if let Err(e) = store.adjust_loyalty_points(order.user_id, order.loyalty_points_earned).await {
                warn!(order_id = %order.id, error = %e, "failed to credit loyalty points");
            }
        }
        OrderStatus::Cancelled => {
            for item in &order.items {
                if let Err(e) = store.adjust_inventory(item.variant_id, item.quantity).await {
                    warn!(order_id = %order.id, variant_id = %item.variant_id, error = %e, "failed to restock cancelled item");
                }
            }
            if order.loyalty_points_used > 0 {
                if let Err(e) = store.adjust_loyalty_points(order.user_id, order.loyalty_points_used).await {
                    warn!(order_id = %order.id, error = %e, "failed to refund loyalty points");
                }
            }
        }
        _ => {}
    }
}

async fn commit_transition(state: &AppState, order: &Order, change: StatusChange) -> Result<(), ApiError> {
    state.store.save_order_status(order, change.from).await?;
    apply_side_effects(state.store.as_ref(), order, change).await;
    info!(order_id = %order.id, from = %change.from, to = %change.to, "order status changed");
    state.events.publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order.id, from: change.from, to: change.to })).await;
    Ok(())
}

// =============================================================================
// Customer routes
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderQuery {
    status: Option<OrderStatus>,
    search: Option<String>,
    user_id: Option<Uuid>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl OrderQuery {
    fn filter(self, user_id: Option<Uuid>) -> OrderFilter {
        OrderFilter {
            user_id, status: self.status, search: self.search,
            pagination: Pagination::new(self.page, self.per_page),
        }
    }
}

async fn my_orders(State(state): State<AppState>, auth: AuthUser, ApiQuery(query): ApiQuery<OrderQuery>) -> ApiResult<Page<Order>> {
    let page = state.store.list_orders(&query.filter(Some(auth.user.id))).await?;
    Ok(ApiResponse::ok(page))
}

/// Customers only see their own orders; admins see any.
async fn owned_order(state: &AppState, user: &User, id: Uuid) -> Result<Order, ApiError> {
    state.store.order(id).await?
        .filter(|o| o.user_id == user.id || user.is_admin())
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))
}

async fn my_order(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Order> {
    Ok(ApiResponse::ok(owned_order(&state, &auth.user, id).await?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTracking {
    pub order_number: String,
    pub status: OrderStatus,
    pub can_cancel: bool,
    pub status_history: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
}

async fn tracking(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<OrderTracking> {
    let order = owned_order(&state, &auth.user, id).await?;
    let status = order.status();
    Ok(ApiResponse::ok(OrderTracking {
        order_number: order.order_number, status, can_cancel: status.customer_can_cancel(),
        status_history: order.status_history, created_at: order.created_at,
    }))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    reason: String,
}

async fn cancel(State(state): State<AppState>, auth: AuthUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<CancelRequest>) -> ApiResult<Order> {
    let mut order = state.store.order(id).await?
        .filter(|o| o.user_id == auth.user.id)
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    let change = order.cancel_by_customer(&req.reason)?;
    commit_transition(&state, &order, change).await?;
    Ok(ApiResponse::with_message(order, "Order cancelled"))
}

// =============================================================================
// Admin routes
// =============================================================================

async fn admin_orders(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<OrderQuery>) -> ApiResult<Page<Order>> {
    let user_id = query.user_id;
    let page = state.store.list_orders(&query.filter(user_id)).await?;
    Ok(ApiResponse::ok(page))
}

async fn admin_order(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Order> {
    let order = state.store.order(id).await?.ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    Ok(ApiResponse::ok(order))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
    #[serde(default)]
    note: Option<String>,
}

async fn update_status(State(state): State<AppState>, AdminUser(admin): AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<StatusRequest>) -> ApiResult<Order> {
    let next: OrderStatus = req.status.parse()?;
    let mut order = state.store.order(id).await?.ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    let change = order.transition(next, req.note)?;
    commit_transition(&state, &order, change).await?;
    info!(admin_id = %admin.id, order_id = %order.id, "admin updated order status");
    Ok(ApiResponse::with_message(order, format!("Order status updated to {next}")))
}

async fn statistics(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<OrderStatistics> {
    Ok(ApiResponse::ok(state.store.order_statistics().await?))
}

#[derive(Debug, Deserialize)]
struct ChartQuery { days: Option<i64> }

async fn revenue_chart(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ChartQuery>) -> ApiResult<Vec<RevenuePoint>> {
    let days = query.days.unwrap_or(DEFAULT_CHART_DAYS).clamp(1, MAX_CHART_DAYS);
    let now = Utc::now();
    let first_day = (now - Duration::days(days - 1)).date_naive();
    let since = first_day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);
    let points = state.store.revenue_by_day(since).await?;
    Ok(ApiResponse::ok(fill_revenue_days(points, since, now)))
}
