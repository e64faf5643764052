//! Domain events
//!
//! Published to NATS as JSON on `ecommerce.<name>` when a connection is
//! configured; otherwise only logged.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Product(ProductEvent),
    Discount(DiscountEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, user_id: Uuid, total: i64 },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid },
    InventoryAdjusted { variant_id: Uuid, delta: i32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiscountEvent {
    Redeemed { code: String, order_id: Uuid },
}

impl DomainEvent {
    /// Subject suffix, e.g. `order.status_changed`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Product(ProductEvent::Created { .. }) => "product.created",
            Self::Product(ProductEvent::InventoryAdjusted { .. }) => "product.inventory_adjusted",
            Self::Discount(DiscountEvent::Redeemed { .. }) => "discount.redeemed",
        }
    }
}

/// Fire-and-forget publisher shared by the request handlers.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub async fn publish(&self, event: DomainEvent) {
        let subject = format!("ecommerce.{}", event.name());
        let Some(client) = &self.nats else {
            tracing::debug!(%subject, ?event, "event (no broker configured)");
            return;
        };
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                    tracing::warn!(%subject, error = %e, "failed to publish event");
                }
            }
            Err(e) => tracing::warn!(%subject, error = %e, "failed to encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_and_payload() {
        let id = Uuid::nil();
        let event = DomainEvent::Order(OrderEvent::StatusChanged { order_id: id, from: OrderStatus::Pending, to: OrderStatus::Confirmed });
        assert_eq!(event.name(), "order.status_changed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["to"], "confirmed");
    }
}
