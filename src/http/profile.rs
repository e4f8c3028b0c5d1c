//! Profile handlers: the caller's own record, addresses and wishlist.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::domain::{Address, Principal, User};
use crate::error::{Error, Result};
use crate::AppState;

pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<Json<User>> {
    state
        .store
        .user(principal.user_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("user"))
}

pub async fn addresses(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Address>>> {
    let user = state
        .store
        .user(principal.user_id)
        .await?
        .ok_or(Error::NotFound("user"))?;
    Ok(Json(user.addresses))
}

pub async fn add_address(
    State(state): State<AppState>,
    principal: Principal,
    Json(address): Json<Address>,
) -> Result<(StatusCode, Json<Address>)> {
    if address.street.trim().is_empty() || address.city.trim().is_empty() {
        return Err(Error::Validation("street and city are required".into()));
    }
    state.store.add_address(principal.user_id, &address).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn wishlist(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Uuid>>> {
    Ok(Json(state.store.wishlist(principal.user_id).await?))
}

pub async fn add_wishlist(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.store.add_wishlist_item(principal.user_id, product_id).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_wishlist(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.store.remove_wishlist_item(principal.user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
