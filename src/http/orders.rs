//! Order handlers. The heavy lifting lives in [`crate::orders`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Order, Principal};
use crate::error::Result;
use crate::orders::{OrderLifecycle, PlaceOrder, StatusChange};
use crate::store::Page;
use crate::AppState;

fn lifecycle(state: &AppState) -> OrderLifecycle<'_> {
    OrderLifecycle::new(state.store.as_ref(), state.notify.as_ref())
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = lifecycle(&state).create(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Order>>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).min(100);
    Ok(Json(lifecycle(&state).list(&principal, page, limit).await?))
}

pub async fn fetch(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    Ok(Json(lifecycle(&state).fetch(&principal, id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Order>> {
    Ok(Json(lifecycle(&state).update_status(&principal, id, change).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub note: Option<String>,
}

pub async fn cancel(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Order>> {
    let note = body.and_then(|Json(req)| req.note);
    Ok(Json(lifecycle(&state).cancel(&principal, id, note).await?))
}
