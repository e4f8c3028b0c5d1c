//! Order lifecycle: creation, status transitions, cancellation.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    coupon, Address, Coupon, Discount, LineItem, Order, OrderStatus, PaymentMethod, Principal,
    ShippingMethod, StatusEntry, TrackingUpdate,
};
use crate::error::{Error, Result};
use crate::notify::{Notify, OrderEvent};
use crate::store::{StockLine, Store, Page};

#[derive(Clone, Debug, Deserialize)]
pub struct PlaceOrder {
    pub items: Vec<OrderItemRequest>,
    pub coupon_code: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub customer_note: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

pub struct OrderLifecycle<'a> {
    store: &'a dyn Store,
    notify: &'a dyn Notify,
}

impl<'a> OrderLifecycle<'a> {
    pub fn new(store: &'a dyn Store, notify: &'a dyn Notify) -> Self {
        Self { store, notify }
    }

    /// Creates an order: snapshots prices, reserves all stock in one shot,
    /// applies the coupon, persists, clears the cart. A failure after the
    /// reservation explicitly releases it so no partial stock movement
    /// survives a failed create.
    pub async fn create(&self, actor: &Principal, req: PlaceOrder) -> Result<Order> {
        if req.items.is_empty() {
            return Err(Error::Validation("order has no items".into()));
        }
        let mut items = Vec::with_capacity(req.items.len());
        let mut stock_lines = Vec::with_capacity(req.items.len());
        for line in &req.items {
            if line.quantity == 0 {
                return Err(Error::Validation("quantity must be at least 1".into()));
            }
            let product = self
                .store
                .product(line.product_id)
                .await?
                .ok_or(Error::NotFound("product"))?;
            let (sku, unit_price) = match line.variant_id {
                Some(vid) => {
                    let variant = product.variant(vid).ok_or(Error::NotFound("variant"))?;
                    (Some(variant.sku.to_string()), variant.price)
                }
                None => (None, product.base_price),
            };
            items.push(LineItem {
                product_id: line.product_id,
                variant_id: line.variant_id,
                name: product.name.clone(),
                sku,
                quantity: line.quantity,
                unit_price,
            });
            stock_lines.push(StockLine {
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
            });
        }

        self.store.reserve_stock(&stock_lines).await?;

        let subtotal: Decimal = items.iter().map(LineItem::line_total).sum();
        let discount = match &req.coupon_code {
            Some(code) => match self.apply_coupon(code, subtotal).await {
                Ok(discount) => Some(discount),
                Err(err) => {
                    self.back_out(&stock_lines).await;
                    return Err(err);
                }
            },
            None => None,
        };

        let order = Order::place(
            actor.user_id,
            items,
            discount,
            req.shipping_method,
            req.shipping_address,
            req.billing_address,
            req.payment_method,
            req.customer_note,
            Utc::now(),
        );
        if let Err(err) = self.store.insert_order(&order).await {
            self.back_out(&stock_lines).await;
            return Err(err);
        }
        self.store.clear_cart(actor.user_id).await?;

        self.emit(OrderEvent::Created {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            total: order.total,
        })
        .await;
        Ok(order)
    }

    /// Moves an order along the status machine. Requests outside the allowed
    /// transition table are rejected. Transitioning to `cancelled` restores
    /// stock exactly like [`Self::cancel`].
    pub async fn update_status(
        &self,
        actor: &Principal,
        id: Uuid,
        change: StatusChange,
    ) -> Result<Order> {
        if !actor.is_admin() {
            return Err(Error::Forbidden);
        }
        if change.status == OrderStatus::Cancelled {
            return self.cancel(actor, id, change.note).await;
        }
        let mut order = self.store.order(id).await?.ok_or(Error::NotFound("order"))?;
        if !order.status.can_transition(change.status) {
            return Err(Error::InvalidTransition { from: order.status, to: change.status });
        }
        let tracking = match (change.carrier, change.tracking_number) {
            (Some(carrier), Some(tracking_number)) => {
                Some(TrackingUpdate { carrier, tracking_number })
            }
            _ => None,
        };
        let entry = StatusEntry { status: change.status, at: Utc::now(), note: change.note };
        self.store.transition_order(id, &entry, tracking.as_ref()).await?;

        order.status = entry.status;
        order.updated_at = entry.at;
        if let Some(t) = &tracking {
            order.shipping.carrier = Some(t.carrier.clone());
            order.shipping.tracking_number = Some(t.tracking_number.clone());
        }
        order.history.push(entry);

        self.emit(OrderEvent::StatusChanged {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            status: order.status,
        })
        .await;
        Ok(order)
    }

    /// Cancels an order that has not shipped yet, restoring the stock it
    /// reserved.
    pub async fn cancel(&self, actor: &Principal, id: Uuid, note: Option<String>) -> Result<Order> {
        let mut order = self.store.order(id).await?.ok_or(Error::NotFound("order"))?;
        if !actor.is_admin() && order.user_id != actor.user_id {
            return Err(Error::Forbidden);
        }
        if !order.status.is_cancellable() {
            return Err(Error::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let lines: Vec<StockLine> = order
            .items
            .iter()
            .map(|item| StockLine {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();
        self.store.release_stock(&lines).await?;

        let note =
            Some(note.unwrap_or_else(|| format!("cancelled by {}", actor.actor_label())));
        let entry = StatusEntry { status: OrderStatus::Cancelled, at: Utc::now(), note };
        self.store.transition_order(id, &entry, None).await?;

        order.status = OrderStatus::Cancelled;
        order.updated_at = entry.at;
        order.history.push(entry.clone());

        self.emit(OrderEvent::Cancelled {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            note: entry.note,
        })
        .await;
        Ok(order)
    }

    /// Fetches one order; customers only see their own.
    pub async fn fetch(&self, actor: &Principal, id: Uuid) -> Result<Order> {
        let order = self.store.order(id).await?.ok_or(Error::NotFound("order"))?;
        if !actor.is_admin() && order.user_id != actor.user_id {
            return Err(Error::Forbidden);
        }
        Ok(order)
    }

    /// Admins list everything (paginated); customers list their own orders.
    pub async fn list(&self, actor: &Principal, page: u32, limit: u32) -> Result<Page<Order>> {
        if actor.is_admin() {
            self.store.orders(page, limit).await
        } else {
            let data = self.store.orders_for_user(actor.user_id).await?;
            Ok(Page { total: data.len() as i64, data, page: 1 })
        }
    }

    async fn apply_coupon(&self, code: &str, subtotal: Decimal) -> Result<Discount> {
        let now = Utc::now();
        let code = Coupon::normalize_code(code);
        let found = self.store.coupon_by_code(&code).await?;
        let (matched, amount) = coupon::evaluate(found, subtotal, now)?;
        // The redeem re-checks eligibility in one conditional update, so the
        // usage cap holds even when two orders race.
        if !self.store.redeem_coupon(matched.id, now).await? {
            return Err(Error::CouponInvalid);
        }
        Ok(Discount { coupon_id: matched.id, amount })
    }

    async fn back_out(&self, lines: &[StockLine]) {
        if let Err(err) = self.store.release_stock(lines).await {
            warn!(%err, "failed to release reserved stock after aborted order");
        }
    }

    async fn emit(&self, event: OrderEvent) {
        if let Err(err) = self.notify.publish(&event).await {
            warn!(%err, "order notification failed");
        }
    }
}
