//! Storefront - Self-hosted E-commerce Backend
//!
//! REST API over a product catalog with per-SKU variants, per-user carts and
//! wishlists, coupons, and the order lifecycle (stock reservation, discount
//! application, status history, cancellation).
//!
//! ## Features
//! - Product catalog with variants, reviews and stock tracking
//! - Shopping cart and checkout
//! - Coupon validation and redemption with usage caps
//! - Order status machine with append-only history
//! - Optional NATS order-event publishing

use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod notify;
pub mod orders;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::Store>,
    pub notify: Arc<dyn notify::Notify>,
}
