//! Order Aggregate
//!
//! The status machine is forward-only along [`OrderStatus::FLOW`] with a
//! single escape hatch to `cancelled` from any non-terminal state. The
//! order's current status is the head of its status history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::FieldErrors;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { Pending, Confirmed, Processing, Shipping, Delivered, Cancelled }

impl OrderStatus {
    /// The regular progression, in rank order.
    pub const FLOW: [OrderStatus; 5] = [Self::Pending, Self::Confirmed, Self::Processing, Self::Shipping, Self::Delivered];
    pub const ALL: [OrderStatus; 6] = [Self::Pending, Self::Confirmed, Self::Processing, Self::Shipping, Self::Delivered, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipping => "shipping",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirmed => 1,
            Self::Processing => 2,
            Self::Shipping => 3,
            Self::Delivered => 4,
            Self::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Statuses an admin may pick for an order currently in `self`.
    ///
    /// A terminal status only offers itself. Otherwise every flow status at
    /// or after the current one is offered, followed by `cancelled`.
    pub fn available_options(self) -> Vec<OrderStatus> {
        if self.is_terminal() { return vec![self]; }
        let mut options: Vec<OrderStatus> = Self::FLOW.iter().copied().filter(|s| s.rank() >= self.rank()).collect();
        options.push(Self::Cancelled);
        options
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        !self.is_terminal() && self.available_options().contains(&next)
    }

    pub fn customer_can_cancel(self) -> bool { matches!(self, Self::Pending | Self::Confirmed) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Refunded, Cancelled }

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Refunded => "refunded", Self::Cancelled => "cancelled" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Paid, Self::Refunded, Self::Cancelled].into_iter()
            .find(|p| p.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Cash on delivery is the only supported method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { #[default] Cod }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry { pub status: OrderStatus, pub note: Option<String>, pub created_at: DateTime<Utc> }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub price: i64,
    pub quantity: i32,
    pub total_price: i64,
}

impl LineItem {
    pub fn line_total(price: i64, quantity: i32) -> i64 { price * i64::from(quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 6, message = "Phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Street address is required"))]
    pub street: String,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i32,
}

/// Body of `POST /orders`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<CheckoutItem>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Loyalty points cannot be negative"))]
    pub loyalty_points_used: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl CheckoutRequest {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => e.into(),
        };
        for (idx, item) in self.items.iter().enumerate() {
            if let Err(e) = item.validate() {
                for (_, message) in FieldErrors::from(e).iter() {
                    errors.add(format!("items[{idx}].quantity"), message);
                }
            }
        }
        if let Err(e) = self.shipping_address.validate() {
            for (field, message) in FieldErrors::from(e).iter() {
                errors.add(format!("shippingAddress.{field}"), message);
            }
        }
        errors.into_result()
    }
}

/// Price breakdown of an order before it is placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub tax: i64,
    pub discount_amount: i64,
    pub loyalty_discount: i64,
    pub total: i64,
    pub loyalty_points_earned: i64,
}

/// Shop-wide pricing knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    pub shipping_fee: i64,
    /// Subtotals at or above this ship free; `0` disables free shipping.
    pub free_shipping_threshold: i64,
    pub tax_rate_percent: i64,
    pub loyalty_point_value: i64,
    /// One point is earned per this many currency units of the total.
    pub loyalty_earn_divisor: i64,
}

impl PricingPolicy {
    pub fn price(&self, subtotal: i64, discount_amount: i64, points_used: i64) -> OrderTotals {
        let discount_amount = discount_amount.clamp(0, subtotal);
        let shipping_fee = if self.free_shipping_threshold > 0 && subtotal >= self.free_shipping_threshold { 0 } else { self.shipping_fee };
        let discounted = subtotal - discount_amount;
        let tax = discounted * self.tax_rate_percent / 100;
        let gross = discounted + tax + shipping_fee;
        let loyalty_discount = (points_used.max(0) * self.loyalty_point_value).min(gross);
        let total = gross - loyalty_discount;
        let loyalty_points_earned = if self.loyalty_earn_divisor > 0 { total / self.loyalty_earn_divisor } else { 0 };
        OrderTotals { subtotal, shipping_fee, tax, discount_amount, loyalty_discount, total, loyalty_points_earned }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub tax: i64,
    pub discount_amount: i64,
    pub discount_code: Option<String>,
    pub loyalty_points_used: i64,
    pub loyalty_points_earned: i64,
    pub total: i64,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub note: Option<String>,
    /// Most recent first.
    pub status_history: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange { pub from: OrderStatus, pub to: OrderStatus }

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        order_number: String,
        user_id: Uuid,
        items: Vec<LineItem>,
        totals: OrderTotals,
        discount_code: Option<String>,
        loyalty_points_used: i64,
        shipping_address: ShippingAddress,
        note: Option<String>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), order_number, user_id, items,
            subtotal: totals.subtotal, shipping_fee: totals.shipping_fee, tax: totals.tax,
            discount_amount: totals.discount_amount, discount_code, loyalty_points_used,
            loyalty_points_earned: totals.loyalty_points_earned, total: totals.total,
            shipping_address, payment_method: PaymentMethod::Cod, payment_status: PaymentStatus::Pending, note,
            status_history: vec![StatusEntry { status: OrderStatus::Pending, note: Some("Order placed".into()), created_at: now }],
            created_at: now,
        })
    }

    pub fn status(&self) -> OrderStatus {
        self.status_history.first().map(|e| e.status).unwrap_or(OrderStatus::Pending)
    }

    pub fn item_count(&self) -> i32 { self.items.iter().map(|i| i.quantity).sum() }

    /// Admin transition. Appends a history entry at the head.
    pub fn transition(&mut self, next: OrderStatus, note: Option<String>) -> Result<StatusChange, OrderError> {
        let current = self.status();
        if current.is_terminal() { return Err(OrderError::Terminal(current)); }
        if !current.can_transition_to(next) { return Err(OrderError::InvalidTransition { from: current, to: next }); }
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.status_history.insert(0, StatusEntry { status: next, note, created_at: Utc::now() });
        match next {
            OrderStatus::Delivered => self.payment_status = PaymentStatus::Paid,
            OrderStatus::Cancelled => self.payment_status = PaymentStatus::Cancelled,
            _ => {}
        }
        Ok(StatusChange { from: current, to: next })
    }

    /// Customer-initiated cancellation; only allowed before processing starts.
    pub fn cancel_by_customer(&mut self, reason: &str) -> Result<StatusChange, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() { return Err(OrderError::ReasonRequired); }
        let current = self.status();
        if !current.customer_can_cancel() { return Err(OrderError::NotCancellable(current)); }
        self.transition(OrderStatus::Cancelled, Some(reason.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Order is already {0}")]
    Terminal(OrderStatus),
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("A cancellation reason is required")]
    ReasonRequired,
    #[error("Orders that are {0} can no longer be cancelled")]
    NotCancellable(OrderStatus),
    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        let item = LineItem {
            product_id: Uuid::now_v7(), variant_id: Uuid::now_v7(), product_name: "Widget".into(), variant_name: "Red".into(),
            sku: "W-RED".into(), price: 10_000, quantity: 2, total_price: 20_000,
        };
        let totals = PricingPolicy { shipping_fee: 30_000, free_shipping_threshold: 0, tax_rate_percent: 0, loyalty_point_value: 1_000, loyalty_earn_divisor: 10_000 }
            .price(20_000, 0, 0);
        Order::place("ORD-1".into(), Uuid::now_v7(), vec![item], totals, None, 0, ShippingAddress::default(), None).unwrap()
    }

    #[test]
    fn test_available_options_forward_only_with_cancel() {
        use OrderStatus::*;
        assert_eq!(Pending.available_options(), vec![Pending, Confirmed, Processing, Shipping, Delivered, Cancelled]);
        assert_eq!(Processing.available_options(), vec![Processing, Shipping, Delivered, Cancelled]);
        assert_eq!(Delivered.available_options(), vec![Delivered]);
        assert_eq!(Cancelled.available_options(), vec![Cancelled]);
        assert!(!Shipping.can_transition_to(Confirmed));
    }

    #[test]
    fn test_customer_cancel_only_early() {
        use OrderStatus::*;
        let allowed: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.customer_can_cancel()).collect();
        assert_eq!(allowed, vec![Pending, Confirmed]);
    }

    #[test]
    fn test_order_workflow() {
        let mut order = sample_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total, 50_000);
        order.transition(OrderStatus::Confirmed, Some("called customer".into())).unwrap();
        order.transition(OrderStatus::Shipping, None).unwrap();
        let change = order.transition(OrderStatus::Delivered, None).unwrap();
        assert_eq!(change, StatusChange { from: OrderStatus::Shipping, to: OrderStatus::Delivered });
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status_history.len(), 4);
        assert_eq!(order.status_history[2].note.as_deref(), Some("called customer"));
        assert_eq!(order.transition(OrderStatus::Cancelled, None), Err(OrderError::Terminal(OrderStatus::Delivered)));
    }

    #[test]
    fn test_customer_cancellation() {
        let mut order = sample_order();
        assert_eq!(order.cancel_by_customer("   "), Err(OrderError::ReasonRequired));
        order.cancel_by_customer("changed my mind").unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.status_history[0].note.as_deref(), Some("changed my mind"));
        assert_eq!(order.payment_status, PaymentStatus::Cancelled);

        let mut shipped = sample_order();
        shipped.transition(OrderStatus::Processing, None).unwrap();
        assert_eq!(shipped.cancel_by_customer("too slow"), Err(OrderError::NotCancellable(OrderStatus::Processing)));
    }

    #[test]
    fn test_pricing_policy() {
        let policy = PricingPolicy { shipping_fee: 30_000, free_shipping_threshold: 500_000, tax_rate_percent: 10, loyalty_point_value: 1_000, loyalty_earn_divisor: 10_000 };
        let t = policy.price(600_000, 100_000, 5);
        assert_eq!(t.shipping_fee, 0);
        assert_eq!(t.tax, 50_000);
        assert_eq!(t.loyalty_discount, 5_000);
        assert_eq!(t.total, 545_000);
        assert_eq!(t.loyalty_points_earned, 54);
        assert_eq!(policy.price(100_000, 0, 0).shipping_fee, 30_000);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("shipping".parse::<OrderStatus>().unwrap(), OrderStatus::Shipping);
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
