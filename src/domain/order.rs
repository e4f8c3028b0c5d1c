//! Order aggregate and its status machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::user::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    /// The allowed (from, to) pairs. Fulfilment moves strictly forward
    /// through pending, processing, shipped, delivered; cancellation is only
    /// reachable before shipment; refunds are reachable from everywhere.
    /// Anything not listed here is rejected.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Pending, Refunded)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
                | (Delivered, Refunded)
                | (Cancelled, Refunded)
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(ShippingMethod::Standard),
            "express" => Some(ShippingMethod::Express),
            _ => None,
        }
    }

    /// Standard shipping is free from $50, otherwise $5.99; express is a
    /// flat $14.99.
    pub fn cost(self, subtotal: Decimal) -> Decimal {
        match self {
            ShippingMethod::Standard => {
                if subtotal >= Decimal::new(50, 0) {
                    Decimal::ZERO
                } else {
                    Decimal::new(599, 2)
                }
            }
            ShippingMethod::Express => Decimal::new(1499, 2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    GooglePay,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::GooglePay => "google_pay",
            PaymentMethod::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit_card" => Some(PaymentMethod::CreditCard),
            "google_pay" => Some(PaymentMethod::GooglePay),
            "paypal" => Some(PaymentMethod::Paypal),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

/// One product/variant plus quantity entry within an order. Name, SKU and
/// unit price are captured at purchase time so later catalog edits do not
/// rewrite history.
#[derive(Clone, Debug, Serialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Discount {
    pub coupon_id: Uuid,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct Shipping {
    pub method: ShippingMethod,
    pub cost: Decimal,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TrackingUpdate {
    pub carrier: String,
    pub tracking_number: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub discount: Option<Discount>,
    pub shipping: Shipping,
    pub total: Decimal,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment: PaymentInfo,
    pub status: OrderStatus,
    /// Append-only log of status changes; the first entry is always
    /// `pending`.
    pub history: Vec<StatusEntry>,
    pub customer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        user_id: Uuid,
        items: Vec<LineItem>,
        discount: Option<Discount>,
        shipping_method: ShippingMethod,
        shipping_address: Address,
        billing_address: Option<Address>,
        payment_method: PaymentMethod,
        customer_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let subtotal: Decimal = items.iter().map(LineItem::line_total).sum();
        let discount_amount = discount.as_ref().map(|d| d.amount).unwrap_or(Decimal::ZERO);
        let shipping = Shipping {
            method: shipping_method,
            cost: shipping_method.cost(subtotal),
            carrier: None,
            tracking_number: None,
        };
        let total = subtotal - discount_amount + shipping.cost;
        Self {
            id: Uuid::new_v4(),
            order_number: format!("ORD-{:08}", rand::random::<u32>()),
            user_id,
            items,
            subtotal,
            discount,
            shipping,
            total,
            shipping_address,
            billing_address,
            payment: PaymentInfo { method: payment_method, status: PaymentStatus::Pending },
            status: OrderStatus::Pending,
            history: vec![StatusEntry {
                status: OrderStatus::Pending,
                at: now,
                note: Some("order placed".into()),
            }],
            customer_note,
            created_at: now,
            updated_at: now,
        }
    }
}
