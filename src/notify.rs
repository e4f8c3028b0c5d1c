//! Order event notifications. Publishing is best-effort: a failure is
//! logged by the caller and never blocks a transition that already
//! committed.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::OrderStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total: Decimal,
    },
    StatusChanged {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        status: OrderStatus,
    },
    Cancelled {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        note: Option<String>,
    },
}

impl OrderEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            OrderEvent::Created { .. } => "orders.created",
            OrderEvent::StatusChanged { .. } => "orders.status_changed",
            OrderEvent::Cancelled { .. } => "orders.cancelled",
        }
    }

    pub fn order_number(&self) -> &str {
        match self {
            OrderEvent::Created { order_number, .. }
            | OrderEvent::StatusChanged { order_number, .. }
            | OrderEvent::Cancelled { order_number, .. } => order_number,
        }
    }
}

#[async_trait]
pub trait Notify: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> anyhow::Result<()>;
}

/// Fallback notifier used when no NATS connection is configured.
pub struct LogNotify;

#[async_trait]
impl Notify for LogNotify {
    async fn publish(&self, event: &OrderEvent) -> anyhow::Result<()> {
        tracing::info!(
            subject = event.subject(),
            order_number = event.order_number(),
            "order event"
        );
        Ok(())
    }
}

/// Publishes each event as JSON on its subject.
pub struct NatsNotify {
    client: async_nats::Client,
}

impl NatsNotify {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notify for NatsNotify {
    async fn publish(&self, event: &OrderEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_map_to_subjects() {
        let event = OrderEvent::Cancelled {
            order_id: Uuid::new_v4(),
            order_number: "ORD-00000001".into(),
            user_id: Uuid::new_v4(),
            note: None,
        };
        assert_eq!(event.subject(), "orders.cancelled");
        assert_eq!(event.order_number(), "ORD-00000001");
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = OrderEvent::StatusChanged {
            order_id: Uuid::new_v4(),
            order_number: "ORD-00000002".into(),
            user_id: Uuid::new_v4(),
            status: OrderStatus::Shipped,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["status"], "shipped");
    }
}
