//! Coupon handlers: public validation plus back-office CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{coupon, Coupon, DiscountType, Principal};
use crate::error::{Error, Result};
use crate::AppState;

use super::require_admin;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub coupon: Coupon,
    pub discount_amount: Decimal,
}

/// Checks a code against a subtotal without consuming a use; the use is
/// consumed when an order actually applies the coupon.
pub async fn validate(
    State(state): State<AppState>,
    _principal: Principal,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    let code = Coupon::normalize_code(&req.code);
    let found = state.store.coupon_by_code(&code).await?;
    let (matched, discount_amount) = coupon::evaluate(found, req.subtotal, Utc::now())?;
    Ok(Json(ValidateResponse { coupon: matched, discount_amount }))
}

pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Coupon>>> {
    require_admin(&principal)?;
    Ok(Json(state.store.coupons().await?))
}

pub async fn fetch(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Coupon>> {
    require_admin(&principal)?;
    state
        .store
        .coupon(id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("coupon"))
}

#[derive(Debug, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub minimum_purchase: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
    pub max_uses: Option<i32>,
    pub is_active: Option<bool>,
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateCoupon>,
) -> Result<(StatusCode, Json<Coupon>)> {
    require_admin(&principal)?;
    if req.discount_amount < Decimal::ZERO {
        return Err(Error::Validation("discount_amount must not be negative".into()));
    }
    let code = Coupon::normalize_code(&req.code);
    if code.is_empty() {
        return Err(Error::Validation("code must not be empty".into()));
    }
    let coupon = Coupon {
        id: Uuid::new_v4(),
        code,
        discount_type: req.discount_type,
        discount_amount: req.discount_amount,
        minimum_purchase: req.minimum_purchase.unwrap_or(Decimal::ZERO),
        starts_at: req.starts_at.unwrap_or_else(Utc::now),
        ends_at: req.ends_at,
        max_uses: req.max_uses,
        used_count: 0,
        is_active: req.is_active.unwrap_or(true),
    };
    state.store.insert_coupon(&coupon).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCoupon {
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_amount: Option<Decimal>,
    pub minimum_purchase: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCoupon>,
) -> Result<Json<Coupon>> {
    require_admin(&principal)?;
    let mut coupon = state.store.coupon(id).await?.ok_or(Error::NotFound("coupon"))?;
    if let Some(code) = req.code {
        let code = Coupon::normalize_code(&code);
        if code.is_empty() {
            return Err(Error::Validation("code must not be empty".into()));
        }
        coupon.code = code;
    }
    if let Some(discount_type) = req.discount_type {
        coupon.discount_type = discount_type;
    }
    if let Some(amount) = req.discount_amount {
        if amount < Decimal::ZERO {
            return Err(Error::Validation("discount_amount must not be negative".into()));
        }
        coupon.discount_amount = amount;
    }
    if let Some(minimum) = req.minimum_purchase {
        coupon.minimum_purchase = minimum;
    }
    if let Some(starts_at) = req.starts_at {
        coupon.starts_at = starts_at;
    }
    if let Some(ends_at) = req.ends_at {
        coupon.ends_at = ends_at;
    }
    if req.max_uses.is_some() {
        coupon.max_uses = req.max_uses;
    }
    if let Some(is_active) = req.is_active {
        coupon.is_active = is_active;
    }
    state.store.update_coupon(&coupon).await?;
    Ok(Json(coupon))
}

pub async fn remove(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    require_admin(&principal)?;
    state.store.delete_coupon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
