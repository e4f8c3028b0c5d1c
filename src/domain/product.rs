//! Product catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// SKU (Stock Keeping Unit) value object. Uppercased, non-empty, bounded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() {
            return Err(Error::Validation("sku must not be empty".into()));
        }
        if value.len() > 50 {
            return Err(Error::Validation("sku must be at most 50 characters".into()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Clothing,
    Books,
    Home,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Clothing => "clothing",
            Category::Books => "books",
            Category::Home => "home",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "electronics" => Some(Category::Electronics),
            "clothing" => Some(Category::Clothing),
            "books" => Some(Category::Books),
            "home" => Some(Category::Home),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Draft,
    OutOfStock,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Draft => "draft",
            ProductStatus::OutOfStock => "out_of_stock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProductStatus::Active),
            "draft" => Some(ProductStatus::Draft),
            "out_of_stock" => Some(ProductStatus::OutOfStock),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAttributes {
    pub size: Option<String>,
    pub color: Option<String>,
    pub style: Option<String>,
}

/// A purchasable SKU-level configuration of a product with its own price and
/// stock.
#[derive(Clone, Debug, Serialize)]
pub struct Variant {
    pub id: Uuid,
    pub sku: Sku,
    pub attributes: VariantAttributes,
    pub price: Decimal,
    pub stock: i32,
    pub images: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Review {
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: Decimal,
    pub category: Category,
    pub variants: Vec<Variant>,
    pub default_images: Vec<String>,
    pub status: ProductStatus,
    pub rating: f64,
    pub reviews: Vec<Review>,
    pub stock: i32,
    pub low_stock_threshold: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn variant(&self, id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Unit price for a line: the variant price when a variant is ordered,
    /// the base price otherwise. `None` when the variant does not belong to
    /// this product.
    pub fn unit_price(&self, variant_id: Option<Uuid>) -> Option<Decimal> {
        match variant_id {
            Some(id) => self.variant(id).map(|v| v.price),
            None => Some(self.base_price),
        }
    }

    /// A product with variants is low on stock when any variant sits at or
    /// below the threshold. Products without variants never report low stock.
    pub fn is_low_stock(&self) -> bool {
        self.variants
            .iter()
            .any(|v| v.stock <= self.low_stock_threshold)
    }

    pub fn average_rating(reviews: &[Review]) -> f64 {
        if reviews.is_empty() {
            return 0.0;
        }
        reviews.iter().map(|r| r.rating as f64).sum::<f64>() / reviews.len() as f64
    }
}
