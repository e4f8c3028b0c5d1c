//! HTTP-level tests: the router wired to the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use storefront::domain::{Coupon, DiscountType};
use storefront::notify::LogNotify;
use storefront::store::{CouponStore, MemStore};
use storefront::AppState;

fn app() -> (Router, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    let state = AppState { store: store.clone(), notify: Arc::new(LogNotify) };
    (storefront::http::router(state), store)
}

fn request(
    method: &str,
    uri: &str,
    principal: Option<(Uuid, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = principal {
        builder = builder
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().expect("decimal field").parse().unwrap()
}

fn percent_coupon(code: &str, amount: i64) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4(),
        code: code.into(),
        discount_type: DiscountType::Percentage,
        discount_amount: Decimal::new(amount, 0),
        minimum_purchase: Decimal::ZERO,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        max_uses: None,
        used_count: 0,
        is_active: true,
    }
}

#[tokio::test]
async fn health_reports_the_service() {
    let (app, _) = app();
    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "storefront");
}

#[tokio::test]
async fn the_cart_requires_a_principal() {
    let (app, _) = app();
    let response = app
        .oneshot(request("GET", "/api/cart", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_creation_is_admin_only() {
    let (app, _) = app();
    let body = json!({
        "name": "Widget",
        "description": "A widget",
        "base_price": 10,
        "category": "electronics"
    });
    let response = app
        .oneshot(request(
            "POST",
            "/api/products",
            Some((Uuid::new_v4(), "customer")),
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn coupon_validation_computes_the_discount() {
    let (app, store) = app();
    store.insert_coupon(&percent_coupon("SAVE10", 10)).await.unwrap();

    let body = json!({"code": "save10", "subtotal": 200});
    let response = app
        .oneshot(request(
            "POST",
            "/api/coupons/validate",
            Some((Uuid::new_v4(), "customer")),
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(decimal(&body["discount_amount"]), Decimal::new(20, 0));
    assert_eq!(body["coupon"]["code"], "SAVE10");
}

#[tokio::test]
async fn an_expired_coupon_validates_as_not_found() {
    let (app, store) = app();
    let mut stale = percent_coupon("OLD", 10);
    stale.ends_at = Utc::now() - Duration::days(1);
    store.insert_coupon(&stale).await.unwrap();

    let body = json!({"code": "OLD", "subtotal": 200});
    let response = app
        .oneshot(request(
            "POST",
            "/api/coupons/validate",
            Some((Uuid::new_v4(), "customer")),
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn a_purchase_runs_end_to_end() {
    let (app, _) = app();
    let admin = (Uuid::new_v4(), "admin");
    let buyer = (Uuid::new_v4(), "customer");

    // Admin stocks the shelf.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/products",
            Some(admin),
            Some(json!({
                "name": "Widget",
                "description": "A widget",
                "base_price": 100,
                "category": "electronics",
                "stock": 5
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = body_json(response).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    // Buyer fills the cart.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/cart/items",
            Some(buyer),
            Some(json!({"product_id": product_id, "quantity": 2})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Buyer places the order.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/orders",
            Some(buyer),
            Some(json!({
                "items": [{"product_id": product_id, "quantity": 2}],
                "shipping_method": "standard",
                "shipping_address": {
                    "street": "1 Main St",
                    "city": "Springfield",
                    "zip": "12345"
                },
                "payment_method": "credit_card"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(decimal(&order["total"]), Decimal::new(200, 0));
    let order_id = order["id"].as_str().unwrap().to_string();

    // Stock went down, the cart is empty.
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/api/products/{product_id}"), None, None))
        .await
        .unwrap();
    let product = body_json(response).await;
    assert_eq!(product["stock"], 3);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/cart", Some(buyer), None))
        .await
        .unwrap();
    let cart = body_json(response).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    // Another customer cannot read the order.
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/orders/{order_id}"),
            Some((Uuid::new_v4(), "customer")),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Skipping the machine ahead is rejected.
    let response = app
        .clone()
        .oneshot(request(
            "PATCH",
            &format!("/api/orders/{order_id}/status"),
            Some(admin),
            Some(json!({"status": "delivered"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Cancelling puts the stock back.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/orders/{order_id}/cancel"),
            Some(buyer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["history"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(request("GET", &format!("/api/products/{product_id}"), None, None))
        .await
        .unwrap();
    let product = body_json(response).await;
    assert_eq!(product["stock"], 5);
}

#[tokio::test]
async fn ordering_more_than_the_shelf_holds_is_a_conflict() {
    let (app, _) = app();
    let admin = (Uuid::new_v4(), "admin");
    let buyer = (Uuid::new_v4(), "customer");

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/products",
            Some(admin),
            Some(json!({
                "name": "Rare",
                "description": "Nearly gone",
                "base_price": 10,
                "category": "books",
                "stock": 1
            })),
        ))
        .await
        .unwrap();
    let product = body_json(response).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request(
            "POST",
            "/api/orders",
            Some(buyer),
            Some(json!({
                "items": [{"product_id": product_id, "quantity": 2}],
                "shipping_method": "standard",
                "shipping_address": {
                    "street": "1 Main St",
                    "city": "Springfield",
                    "zip": "12345"
                },
                "payment_method": "paypal"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["message"], "insufficient stock for Rare");
}
