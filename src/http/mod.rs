//! HTTP surface. Routing, the gateway-principal extractor and the handler
//! modules.

pub mod cart;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod profile;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::{Principal, Role};
use crate::error::{Error, Result};
use crate::AppState;

/// Headers set by the auth gateway in front of this service. Their contents
/// are trusted as-is.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(Error::Unauthorized)?;
        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or(Error::Unauthorized)?;
        Ok(Principal { user_id, role })
    }
}

pub(crate) fn require_admin(principal: &Principal) -> Result<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront"}))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(products::list).post(products::create))
        .route(
            "/api/products/:id",
            get(products::fetch).put(products::update).delete(products::remove),
        )
        .route("/api/products/:id/reviews", post(products::add_review))
        .route("/api/products/:id/stock", post(products::adjust_stock))
        .route("/api/cart", get(cart::fetch).delete(cart::clear))
        .route("/api/cart/items", post(cart::add_item))
        .route(
            "/api/cart/items/:product_id",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/api/orders", get(orders::list).post(orders::create))
        .route("/api/orders/:id", get(orders::fetch))
        .route("/api/orders/:id/status", patch(orders::update_status))
        .route("/api/orders/:id/cancel", post(orders::cancel))
        .route("/api/coupons/validate", post(coupons::validate))
        .route("/api/coupons", get(coupons::list).post(coupons::create))
        .route(
            "/api/coupons/:id",
            get(coupons::fetch).patch(coupons::update).delete(coupons::remove),
        )
        .route("/api/wishlist", get(profile::wishlist))
        .route(
            "/api/wishlist/:product_id",
            post(profile::add_wishlist).delete(profile::remove_wishlist),
        )
        .route("/api/me", get(profile::me))
        .route("/api/me/addresses", get(profile::addresses).post(profile::add_address))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
