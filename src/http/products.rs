//! Product catalog handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    Category, Principal, Product, ProductStatus, Review, Sku, Variant, VariantAttributes,
};
use crate::error::{Error, Result};
use crate::store::{Page, ProductQuery};
use crate::AppState;

use super::require_admin;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<Category>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Product>>> {
    let query = ProductQuery {
        category: params.category,
        search: params.search,
        min_price: params.min_price,
        max_price: params.max_price,
        sort: params.sort,
        page: params.page.unwrap_or(1).max(1),
        limit: params.limit.unwrap_or(20).min(100),
    };
    Ok(Json(state.store.products(&query).await?))
}

pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>> {
    state
        .store
        .product(id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("product"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VariantRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    #[serde(default)]
    pub attributes: VariantAttributes,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub base_price: Decimal,
    pub category: Category,
    #[serde(default)]
    pub default_images: Vec<String>,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub stock: i32,
    pub low_stock_threshold: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate]
    pub variants: Vec<VariantRequest>,
}

impl ProductRequest {
    fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|err| Error::Validation(err.to_string()))?;
        if self.base_price < Decimal::ZERO {
            return Err(Error::Validation("base_price must not be negative".into()));
        }
        if self.stock < 0 {
            return Err(Error::Validation("stock must not be negative".into()));
        }
        for variant in &self.variants {
            if variant.price < Decimal::ZERO {
                return Err(Error::Validation("variant price must not be negative".into()));
            }
            if variant.stock < 0 {
                return Err(Error::Validation("variant stock must not be negative".into()));
            }
        }
        Ok(())
    }

    fn variants(&self) -> Result<Vec<Variant>> {
        self.variants
            .iter()
            .map(|v| {
                Ok(Variant {
                    id: Uuid::new_v4(),
                    sku: Sku::new(&v.sku)?,
                    attributes: v.attributes.clone(),
                    price: v.price,
                    stock: v.stock,
                    images: v.images.clone(),
                })
            })
            .collect()
    }
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    require_admin(&principal)?;
    req.check()?;
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        name: req.name.clone(),
        description: req.description.clone(),
        base_price: req.base_price,
        category: req.category,
        variants: req.variants()?,
        default_images: req.default_images.clone(),
        status: req.status.unwrap_or_default(),
        rating: 0.0,
        reviews: vec![],
        stock: req.stock,
        low_stock_threshold: req.low_stock_threshold.unwrap_or(5),
        tags: req.tags.clone(),
        created_at: now,
        updated_at: now,
    };
    state.store.insert_product(&product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<Product>> {
    require_admin(&principal)?;
    req.check()?;
    let existing = state
        .store
        .product(id)
        .await?
        .ok_or(Error::NotFound("product"))?;
    let product = Product {
        id,
        name: req.name.clone(),
        description: req.description.clone(),
        base_price: req.base_price,
        category: req.category,
        variants: req.variants()?,
        default_images: req.default_images.clone(),
        status: req.status.unwrap_or(existing.status),
        rating: existing.rating,
        reviews: existing.reviews,
        stock: req.stock,
        low_stock_threshold: req.low_stock_threshold.unwrap_or(existing.low_stock_threshold),
        tags: req.tags.clone(),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.store.update_product(&product).await?;
    Ok(Json(product))
}

pub async fn remove(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    require_admin(&principal)?;
    state.store.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    pub comment: Option<String>,
}

pub async fn add_review(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    req.validate().map_err(|err| Error::Validation(err.to_string()))?;
    let review = Review {
        user_id: principal.user_id,
        rating: req.rating,
        comment: req.comment,
        created_at: Utc::now(),
    };
    let rating = state.store.add_review(id, &review).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "rating": rating }))))
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub variant_id: Option<Uuid>,
    pub delta: i32,
}

/// Manual stock correction for back-office use; order flows go through the
/// reservation path instead.
pub async fn adjust_stock(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&principal)?;
    let stock = state.store.adjust_stock(id, req.variant_id, req.delta).await?;
    Ok(Json(serde_json::json!({ "stock": stock })))
}
