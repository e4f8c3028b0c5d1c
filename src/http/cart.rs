//! Per-user cart handlers. The cart is server state, fetched and mutated
//! per request; nothing is kept in process memory.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CartItem, Principal};
use crate::error::{Error, Result};
use crate::AppState;

/// A cart line joined with the current catalog: name and price reflect the
/// product as it is now, not as it was when added.
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

pub async fn fetch(State(state): State<AppState>, principal: Principal) -> Result<Json<CartView>> {
    let items = state.store.cart(principal.user_id).await?;
    let mut lines = Vec::with_capacity(items.len());
    let mut subtotal = Decimal::ZERO;
    for item in items {
        // Lines whose product has been removed from the catalog are not
        // shown; they stay in storage until the cart is cleared.
        let Some(product) = state.store.product(item.product_id).await? else {
            continue;
        };
        let (sku, unit_price) = match item.variant_id {
            Some(vid) => match product.variant(vid) {
                Some(variant) => (Some(variant.sku.to_string()), variant.price),
                None => continue,
            },
            None => (None, product.base_price),
        };
        let line_total = unit_price * Decimal::from(item.quantity);
        subtotal += line_total;
        lines.push(CartLine {
            product_id: item.product_id,
            variant_id: item.variant_id,
            name: product.name,
            sku,
            quantity: item.quantity,
            unit_price,
            line_total,
        });
    }
    Ok(Json(CartView { items: lines, subtotal }))
}

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

pub async fn add_item(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<AddItem>,
) -> Result<(StatusCode, Json<CartItem>)> {
    if req.quantity == 0 {
        return Err(Error::Validation("quantity must be at least 1".into()));
    }
    let item = CartItem {
        product_id: req.product_id,
        variant_id: req.variant_id,
        quantity: req.quantity,
    };
    state.store.add_cart_item(principal.user_id, &item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
pub struct LineSelector {
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityChange {
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

pub async fn update_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
    Json(req): Json<QuantityChange>,
) -> Result<StatusCode> {
    state
        .store
        .set_cart_quantity(principal.user_id, product_id, req.variant_id, req.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
    Query(selector): Query<LineSelector>,
) -> Result<StatusCode> {
    state
        .store
        .remove_cart_item(principal.user_id, product_id, selector.variant_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear(State(state): State<AppState>, principal: Principal) -> Result<StatusCode> {
    state.store.clear_cart(principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
