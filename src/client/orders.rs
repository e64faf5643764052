//! Order detail screens and cart checkout.
//!
//! Status changes are never applied locally: after the server accepts a
//! transition the order is fetched again.

use tracing::info;
use uuid::Uuid;

use super::{ApiClient, ClientError};
use crate::domain::aggregates::{Cart, CartError, Order, OrderStatus, ShippingAddress};
use crate::domain::FieldErrors;

/// Whose view of the order this is; decides which routes are used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience { Customer, Admin }

pub struct OrderDetail {
    client: ApiClient,
    audience: Audience,
    order: Order,
}

impl OrderDetail {
    pub async fn customer(client: ApiClient, id: Uuid) -> Result<Self, ClientError> {
        let order = client.my_order(id).await?;
        Ok(Self { client, audience: Audience::Customer, order })
    }

    pub async fn admin(client: ApiClient, id: Uuid) -> Result<Self, ClientError> {
        let order = client.admin_order(id).await?;
        Ok(Self { client, audience: Audience::Admin, order })
    }

    pub fn order(&self) -> &Order { &self.order }

    pub fn status(&self) -> OrderStatus { self.order.status() }

    pub fn can_cancel(&self) -> bool { self.audience == Audience::Customer && self.status().customer_can_cancel() }

    /// Statuses the admin may pick next; a finished order offers only its own.
    pub fn status_options(&self) -> Vec<OrderStatus> { self.status().available_options() }

    pub async fn refresh(&mut self) -> Result<&Order, ClientError> {
        self.order = match self.audience {
            Audience::Customer => self.client.my_order(self.order.id).await?,
            Audience::Admin => self.client.admin_order(self.order.id).await?,
        };
        Ok(&self.order)
    }

    pub async fn cancel(&mut self, reason: &str) -> Result<&Order, ClientError> {
        if reason.trim().is_empty() {
            let mut errors = FieldErrors::new();
            errors.add("reason", "Please tell us why you are cancelling");
            return Err(errors.into());
        }
        if !self.can_cancel() {
            return Err(ClientError::Blocked(format!("Order {} can no longer be cancelled", self.order.order_number)));
        }
        self.client.cancel_order(self.order.id, reason.trim()).await?;
        info!(order = %self.order.order_number, "order cancelled");
        self.refresh().await
    }

    pub async fn update_status(&mut self, status: OrderStatus, note: Option<&str>) -> Result<&Order, ClientError> {
        if self.audience != Audience::Admin || self.status().is_terminal() || !self.status_options().contains(&status) {
            return Err(ClientError::Blocked(format!("Cannot move order from {} to {}", self.status(), status)));
        }
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        self.client.update_order_status(self.order.id, status, note).await?;
        self.refresh().await
    }
}

/// Places the cart as an order and empties it on success.
pub async fn checkout_cart(
    client: &ApiClient,
    cart: &mut Cart,
    shipping_address: ShippingAddress,
    discount_code: Option<String>,
    loyalty_points_used: i64,
    note: Option<String>,
) -> Result<Order, ClientError> {
    let discount_code = discount_code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty());
    let request = cart.to_checkout(shipping_address, discount_code, loyalty_points_used, note)
        .map_err(|e: CartError| ClientError::Blocked(e.to_string()))?;
    request.check()?;
    let order = client.checkout(&request).await?;
    cart.clear();
    Ok(order)
}
