//! Persistence traits. Production uses [`postgres::PgStore`]; the
//! integration tests run against [`memory::MemStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    Address, CartItem, Category, Coupon, Order, Product, Review, StatusEntry, TrackingUpdate, User,
};
use crate::error::Result;

pub use memory::MemStore;
pub use postgres::PgStore;

/// A stock movement for one order line, applied as a batch by
/// `reserve_stock` / `release_stock`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub category: Option<Category>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Whitelisted field name, `-` prefix for descending. Defaults to newest
    /// first.
    pub sort: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

/// Sort fields accepted by product listings. Anything else falls back to
/// newest-first.
pub(crate) fn product_sort(sort: Option<&str>) -> (&'static str, bool) {
    let (field, desc) = match sort {
        Some(s) if s.starts_with('-') => (&s[1..], true),
        Some(s) => (s, false),
        None => ("created_at", true),
    };
    match field {
        "name" => ("name", desc),
        "price" | "base_price" => ("base_price", desc),
        "rating" => ("rating", desc),
        "created_at" => ("created_at", desc),
        _ => ("created_at", true),
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>>;
    /// Full replacement of the mutable catalog fields, variants included.
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn delete_product(&self, id: Uuid) -> Result<()>;
    /// Appends a review and returns the recomputed average rating.
    async fn add_review(&self, product_id: Uuid, review: &Review) -> Result<f64>;

    /// Applies `delta` to the stock of the product, or of one of its
    /// variants, refusing to drive it negative. The check and the write are
    /// a single conditional update. Returns the new stock level.
    async fn adjust_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        delta: i32,
    ) -> Result<i32>;

    /// Decrements stock for every line, all or nothing: if any line is
    /// unknown or short on stock, no stock changes at all.
    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<()>;

    /// Restores stock for every line (the inverse of `reserve_stock`).
    /// Lines whose product or variant has since been deleted are skipped.
    async fn release_stock(&self, lines: &[StockLine]) -> Result<()>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>>;
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn coupons(&self) -> Result<Vec<Coupon>>;
    async fn update_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn delete_coupon(&self, id: Uuid) -> Result<()>;
    /// Consumes one use, guarded by the same eligibility predicate the
    /// evaluation uses, in a single conditional update. Returns `false` when
    /// the coupon was no longer redeemable (raced out or expired).
    async fn redeem_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    async fn orders(&self, page: u32, limit: u32) -> Result<Page<Order>>;
    /// Sets the status, appends the history entry and (optionally) attaches
    /// tracking details in one shot. Orders are never deleted.
    async fn transition_order(
        &self,
        id: Uuid,
        entry: &StatusEntry,
        tracking: Option<&TrackingUpdate>,
    ) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn user(&self, id: Uuid) -> Result<Option<User>>;
    async fn add_address(&self, user_id: Uuid, address: &Address) -> Result<()>;

    async fn cart(&self, user_id: Uuid) -> Result<Vec<CartItem>>;
    /// Adds a line, merging quantities when the product/variant pair is
    /// already in the cart.
    async fn add_cart_item(&self, user_id: Uuid, item: &CartItem) -> Result<()>;
    /// Sets a line's quantity; zero removes the line.
    async fn set_cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<()>;
    async fn remove_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<()>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<()>;

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()>;
    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()>;
}

pub trait Store: ProductStore + CouponStore + OrderStore + UserStore {}

impl<T: ProductStore + CouponStore + OrderStore + UserStore> Store for T {}
