//! Domain events
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Review(ReviewEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: String, amount_minor: i64, method: String },
    Paid { order_id: Uuid },
    StatusChanged { order_id: Uuid, from: String, to: String },
    Cancelled { order_id: Uuid, reason: String },
    Completed { order_id: Uuid },
    RefundRequested { order_id: Uuid },
    RefundResolved { order_id: Uuid, status: String },
    Deleted { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReviewEvent {
    Created { review_id: Uuid, product_id: String, rating: u8 },
}

impl DomainEvent {
    /// Routing subject, e.g. `storefront.order.cancelled`.
    pub fn subject(&self, prefix: &str) -> String {
        let (entity, name) = match self {
            DomainEvent::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::Completed { .. } => "completed",
                OrderEvent::RefundRequested { .. } => "refund_requested",
                OrderEvent::RefundResolved { .. } => "refund_resolved",
                OrderEvent::Deleted { .. } => "deleted",
            }),
            DomainEvent::Review(ReviewEvent::Created { .. }) => ("review", "created"),
        };
        format!("{prefix}.{entity}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_payload() {
        let id = Uuid::nil();
        let event = DomainEvent::Order(OrderEvent::Cancelled { order_id: id, reason: "late".into() });
        assert_eq!(event.subject("storefront"), "storefront.order.cancelled");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["entity"], "order");
        assert_eq!(json["event"], "cancelled");
        assert_eq!(json["reason"], "late");
    }
}
