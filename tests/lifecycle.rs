//! Order lifecycle tests over the in-memory store: stock reservation and
//! release, coupon application, status transitions, ownership checks.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::domain::{
    Address, CartItem, Category, Coupon, DiscountType, OrderStatus, PaymentMethod, Principal,
    Product, ProductStatus, Role, ShippingMethod, Sku, Variant, VariantAttributes,
};
use storefront::notify::LogNotify;
use storefront::orders::{OrderItemRequest, OrderLifecycle, PlaceOrder, StatusChange};
use storefront::store::{CouponStore, MemStore, ProductStore, UserStore};
use storefront::Error;

fn customer() -> Principal {
    Principal { user_id: Uuid::new_v4(), role: Role::Customer }
}

fn admin() -> Principal {
    Principal { user_id: Uuid::new_v4(), role: Role::Admin }
}

fn product(name: &str, price: Decimal, stock: i32) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(),
        name: name.into(),
        description: format!("{name} description"),
        base_price: price,
        category: Category::Electronics,
        variants: vec![],
        default_images: vec![],
        status: ProductStatus::Active,
        rating: 0.0,
        reviews: vec![],
        stock,
        low_stock_threshold: 5,
        tags: vec![],
        created_at: now,
        updated_at: now,
    }
}

fn coupon(code: &str, discount_type: DiscountType, amount: i64) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4(),
        code: code.into(),
        discount_type,
        discount_amount: Decimal::new(amount, 0),
        minimum_purchase: Decimal::ZERO,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        max_uses: None,
        used_count: 0,
        is_active: true,
    }
}

fn order_for(product_id: Uuid, quantity: u32) -> PlaceOrder {
    PlaceOrder {
        items: vec![OrderItemRequest { product_id, variant_id: None, quantity }],
        coupon_code: None,
        shipping_method: ShippingMethod::Standard,
        shipping_address: Address {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: None,
            zip: "12345".into(),
            country: "US".into(),
        },
        billing_address: None,
        payment_method: PaymentMethod::CreditCard,
        customer_note: None,
    }
}

async fn stock_of(store: &MemStore, product_id: Uuid) -> i32 {
    store.product(product_id).await.unwrap().unwrap().stock
}

#[tokio::test]
async fn creating_an_order_reserves_stock_and_clears_the_cart() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();
    store
        .add_cart_item(
            buyer.user_id,
            &CartItem { product_id: widget.id, variant_id: None, quantity: 2 },
        )
        .await
        .unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, order_for(widget.id, 2)).await.unwrap();

    assert_eq!(stock_of(&store, widget.id).await, 3);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal, Decimal::new(200, 0));
    // Over the free-shipping threshold.
    assert_eq!(order.total, Decimal::new(200, 0));
    assert_eq!(order.history.len(), 1);
    assert!(store.cart(buyer.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_restores_stock_and_logs_both_statuses() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let widget = product("Widget", Decimal::new(25, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, order_for(widget.id, 2)).await.unwrap();
    assert_eq!(stock_of(&store, widget.id).await, 3);

    let cancelled = lifecycle.cancel(&buyer, order.id, None).await.unwrap();

    assert_eq!(stock_of(&store, widget.id).await, 5);
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let statuses: Vec<OrderStatus> = cancelled.history.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Cancelled]);
    assert_eq!(
        cancelled.history[1].note.as_deref(),
        Some("cancelled by customer")
    );
}

#[tokio::test]
async fn a_delivered_order_cannot_be_cancelled() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let boss = admin();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, order_for(widget.id, 2)).await.unwrap();
    for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
        lifecycle
            .update_status(
                &boss,
                order.id,
                StatusChange { status, note: None, carrier: None, tracking_number: None },
            )
            .await
            .unwrap();
    }

    let err = lifecycle.cancel(&buyer, order.id, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    // Stock stays reserved by the delivered order.
    assert_eq!(stock_of(&store, widget.id).await, 3);
}

#[tokio::test]
async fn a_failing_line_item_leaves_every_stock_untouched() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let plenty = product("Plenty", Decimal::new(10, 0), 5);
    let scarce = product("Scarce", Decimal::new(10, 0), 1);
    store.insert_product(&plenty).await.unwrap();
    store.insert_product(&scarce).await.unwrap();

    let mut req = order_for(plenty.id, 2);
    req.items.push(OrderItemRequest { product_id: scarce.id, variant_id: None, quantity: 2 });

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let err = lifecycle.create(&buyer, req).await.unwrap_err();

    assert!(matches!(err, Error::InsufficientStock { .. }));
    assert_eq!(stock_of(&store, plenty.id).await, 5);
    assert_eq!(stock_of(&store, scarce.id).await, 1);
}

#[tokio::test]
async fn a_percentage_coupon_discounts_the_total_and_consumes_a_use() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    let save = coupon("SAVE10", DiscountType::Percentage, 10);
    store.insert_product(&widget).await.unwrap();
    store.insert_coupon(&save).await.unwrap();

    let mut req = order_for(widget.id, 2);
    req.coupon_code = Some("save10".into());

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, req).await.unwrap();

    assert_eq!(order.subtotal, Decimal::new(200, 0));
    let discount = order.discount.expect("discount applied");
    assert_eq!(discount.amount, Decimal::new(20, 0));
    assert_eq!(order.total, Decimal::new(180, 0));
    let used = store.coupon(save.id).await.unwrap().unwrap().used_count;
    assert_eq!(used, 1);
}

#[tokio::test]
async fn below_minimum_purchase_releases_the_reservation() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    let mut picky = coupon("BIGSPEND", DiscountType::Fixed, 15);
    picky.minimum_purchase = Decimal::new(500, 0);
    store.insert_product(&widget).await.unwrap();
    store.insert_coupon(&picky).await.unwrap();

    let mut req = order_for(widget.id, 2);
    req.coupon_code = Some("BIGSPEND".into());

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let err = lifecycle.create(&buyer, req).await.unwrap_err();

    assert!(matches!(err, Error::BelowMinimum { .. }));
    assert_eq!(stock_of(&store, widget.id).await, 5);
    let used = store.coupon(picky.id).await.unwrap().unwrap().used_count;
    assert_eq!(used, 0);
}

#[tokio::test]
async fn an_expired_coupon_fails_the_order_and_releases_stock() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    let mut stale = coupon("OLDNEWS", DiscountType::Fixed, 15);
    stale.ends_at = Utc::now() - Duration::days(1);
    store.insert_product(&widget).await.unwrap();
    store.insert_coupon(&stale).await.unwrap();

    let mut req = order_for(widget.id, 2);
    req.coupon_code = Some("OLDNEWS".into());

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let err = lifecycle.create(&buyer, req).await.unwrap_err();

    assert!(matches!(err, Error::CouponInvalid));
    assert_eq!(stock_of(&store, widget.id).await, 5);
}

#[tokio::test]
async fn the_usage_cap_holds_across_orders() {
    let store = MemStore::new();
    let notify = LogNotify;
    let widget = product("Widget", Decimal::new(100, 0), 10);
    let mut once = coupon("ONETIME", DiscountType::Fixed, 5);
    once.max_uses = Some(1);
    store.insert_product(&widget).await.unwrap();
    store.insert_coupon(&once).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);

    let mut first = order_for(widget.id, 1);
    first.coupon_code = Some("ONETIME".into());
    lifecycle.create(&customer(), first).await.unwrap();

    let mut second = order_for(widget.id, 1);
    second.coupon_code = Some("ONETIME".into());
    let err = lifecycle.create(&customer(), second).await.unwrap_err();

    assert!(matches!(err, Error::CouponInvalid));
    let used = store.coupon(once.id).await.unwrap().unwrap().used_count;
    assert_eq!(used, 1);
    // The second order's reservation was rolled back.
    assert_eq!(stock_of(&store, widget.id).await, 9);
}

#[tokio::test]
async fn status_updates_follow_the_transition_table() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let boss = admin();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, order_for(widget.id, 1)).await.unwrap();

    // Skipping straight to delivered is not in the table.
    let err = lifecycle
        .update_status(
            &boss,
            order.id,
            StatusChange {
                status: OrderStatus::Delivered,
                note: None,
                carrier: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered }
    ));

    let updated = lifecycle
        .update_status(
            &boss,
            order.id,
            StatusChange {
                status: OrderStatus::Processing,
                note: Some("picked".into()),
                carrier: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);
    assert_eq!(updated.history.len(), 2);

    // Customers cannot drive the status machine.
    let err = lifecycle
        .update_status(
            &buyer,
            order.id,
            StatusChange {
                status: OrderStatus::Shipped,
                note: None,
                carrier: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden));
}

#[tokio::test]
async fn shipping_a_status_update_attaches_tracking() {
    let store = MemStore::new();
    let notify = LogNotify;
    let boss = admin();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&customer(), order_for(widget.id, 1)).await.unwrap();
    lifecycle
        .update_status(
            &boss,
            order.id,
            StatusChange {
                status: OrderStatus::Processing,
                note: None,
                carrier: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap();
    let shipped = lifecycle
        .update_status(
            &boss,
            order.id,
            StatusChange {
                status: OrderStatus::Shipped,
                note: None,
                carrier: Some("UPS".into()),
                tracking_number: Some("1Z999".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(shipped.shipping.carrier.as_deref(), Some("UPS"));
    assert_eq!(shipped.shipping.tracking_number.as_deref(), Some("1Z999"));
}

#[tokio::test]
async fn updating_the_status_to_cancelled_also_restores_stock() {
    let store = MemStore::new();
    let notify = LogNotify;
    let boss = admin();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&customer(), order_for(widget.id, 2)).await.unwrap();
    assert_eq!(stock_of(&store, widget.id).await, 3);

    let cancelled = lifecycle
        .update_status(
            &boss,
            order.id,
            StatusChange {
                status: OrderStatus::Cancelled,
                note: None,
                carrier: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&store, widget.id).await, 5);
    assert_eq!(cancelled.history[1].note.as_deref(), Some("cancelled by admin"));
}

#[tokio::test]
async fn ordering_a_variant_reserves_the_variant_stock() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let mut shirt = product("Shirt", Decimal::new(20, 0), 50);
    let variant = Variant {
        id: Uuid::new_v4(),
        sku: Sku::new("SHIRT-M").unwrap(),
        attributes: VariantAttributes { size: Some("M".into()), color: None, style: None },
        price: Decimal::new(22, 0),
        stock: 4,
        images: vec![],
    };
    shirt.variants.push(variant.clone());
    store.insert_product(&shirt).await.unwrap();

    let mut req = order_for(shirt.id, 2);
    req.items[0].variant_id = Some(variant.id);

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, req).await.unwrap();

    // Priced at the variant, not the base product.
    assert_eq!(order.subtotal, Decimal::new(44, 0));
    assert_eq!(order.items[0].sku.as_deref(), Some("SHIRT-M"));
    let stored = store.product(shirt.id).await.unwrap().unwrap();
    assert_eq!(stored.variant(variant.id).unwrap().stock, 2);
    assert_eq!(stored.stock, 50);

    lifecycle.cancel(&buyer, order.id, None).await.unwrap();
    let restored = store.product(shirt.id).await.unwrap().unwrap();
    assert_eq!(restored.variant(variant.id).unwrap().stock, 4);
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let store = MemStore::new();
    let notify = LogNotify;
    let buyer = customer();
    let other = customer();
    let boss = admin();
    let widget = product("Widget", Decimal::new(100, 0), 5);
    store.insert_product(&widget).await.unwrap();

    let lifecycle = OrderLifecycle::new(&store, &notify);
    let order = lifecycle.create(&buyer, order_for(widget.id, 1)).await.unwrap();

    assert!(lifecycle.fetch(&buyer, order.id).await.is_ok());
    assert!(lifecycle.fetch(&boss, order.id).await.is_ok());
    let err = lifecycle.fetch(&other, order.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden));

    let mine = lifecycle.list(&buyer, 1, 20).await.unwrap();
    assert_eq!(mine.data.len(), 1);
    let theirs = lifecycle.list(&other, 1, 20).await.unwrap();
    assert!(theirs.data.is_empty());
    let everything = lifecycle.list(&boss, 1, 20).await.unwrap();
    assert_eq!(everything.total, 1);
}

#[tokio::test]
async fn stock_adjustments_refuse_to_go_negative() {
    let store = MemStore::new();
    let widget = product("Widget", Decimal::new(10, 0), 5);
    store.insert_product(&widget).await.unwrap();

    assert_eq!(store.adjust_stock(widget.id, None, -3).await.unwrap(), 2);
    let err = store.adjust_stock(widget.id, None, -10).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));
    assert_eq!(stock_of(&store, widget.id).await, 2);

    let err = store.adjust_stock(Uuid::new_v4(), None, 1).await.unwrap_err();
    assert!(matches!(err, Error::NotFound("product")));
    let err = store
        .adjust_stock(widget.id, Some(Uuid::new_v4()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound("variant")));
}
