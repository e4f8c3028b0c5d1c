//! Postgres-backed store. Stock and coupon usage are guarded by conditional
//! updates so the check and the write are one statement; multi-line stock
//! movements run in a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    Address, CartItem, Category, Coupon, DiscountType, Discount, LineItem, Order, OrderStatus,
    PaymentInfo, PaymentMethod, PaymentStatus, Product, ProductStatus, Review, Shipping,
    ShippingMethod, Sku, StatusEntry, TrackingUpdate, User, Variant, VariantAttributes, Role,
};
use crate::error::{Error, Result};

use super::{
    product_sort, CouponStore, OrderStore, Page, ProductQuery, ProductStore, StockLine, UserStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bad_column(column: &str, value: &str) -> Error {
    Error::Storage(sqlx::Error::Decode(
        format!("unexpected {column} value: {value}").into(),
    ))
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    base_price: Decimal,
    category: String,
    default_images: Vec<String>,
    status: String,
    rating: f64,
    stock: i32,
    low_stock_threshold: i32,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    sku: String,
    attributes: Json<VariantAttributes>,
    price: Decimal,
    stock: i32,
    images: Vec<String>,
}

#[derive(FromRow)]
struct ReviewRow {
    product_id: Uuid,
    user_id: Uuid,
    rating: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_amount: Decimal,
    minimum_purchase: Decimal,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    max_uses: Option<i32>,
    used_count: i32,
    is_active: bool,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    subtotal: Decimal,
    coupon_id: Option<Uuid>,
    discount_amount: Decimal,
    shipping_method: String,
    shipping_cost: Decimal,
    carrier: Option<String>,
    tracking_number: Option<String>,
    total: Decimal,
    shipping_address: Json<Address>,
    billing_address: Option<Json<Address>>,
    payment_method: String,
    payment_status: String,
    status: String,
    customer_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    name: String,
    sku: Option<String>,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(FromRow)]
struct HistoryRow {
    order_id: Uuid,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    addresses: Json<Vec<Address>>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CartRow {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
}

// ---------------------------------------------------------------------------
// Row -> domain
// ---------------------------------------------------------------------------

fn variant_from_row(row: VariantRow) -> Result<Variant> {
    Ok(Variant {
        id: row.id,
        sku: Sku::new(row.sku)?,
        attributes: row.attributes.0,
        price: row.price,
        stock: row.stock,
        images: row.images,
    })
}

fn review_from_row(row: ReviewRow) -> Review {
    Review {
        user_id: row.user_id,
        rating: row.rating,
        comment: row.comment,
        created_at: row.created_at,
    }
}

fn product_from_row(row: ProductRow, variants: Vec<Variant>, reviews: Vec<Review>) -> Result<Product> {
    Ok(Product {
        id: row.id,
        name: row.name,
        description: row.description,
        base_price: row.base_price,
        category: Category::parse(&row.category)
            .ok_or_else(|| bad_column("category", &row.category))?,
        variants,
        default_images: row.default_images,
        status: ProductStatus::parse(&row.status)
            .ok_or_else(|| bad_column("status", &row.status))?,
        rating: row.rating,
        reviews,
        stock: row.stock,
        low_stock_threshold: row.low_stock_threshold,
        tags: row.tags,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn coupon_from_row(row: CouponRow) -> Result<Coupon> {
    Ok(Coupon {
        id: row.id,
        code: row.code,
        discount_type: DiscountType::parse(&row.discount_type)
            .ok_or_else(|| bad_column("discount_type", &row.discount_type))?,
        discount_amount: row.discount_amount,
        minimum_purchase: row.minimum_purchase,
        starts_at: row.starts_at,
        ends_at: row.ends_at,
        max_uses: row.max_uses,
        used_count: row.used_count,
        is_active: row.is_active,
    })
}

fn order_from_row(
    row: OrderRow,
    items: Vec<LineItem>,
    history: Vec<StatusEntry>,
) -> Result<Order> {
    let discount = match row.coupon_id {
        Some(coupon_id) => Some(Discount { coupon_id, amount: row.discount_amount }),
        None => None,
    };
    Ok(Order {
        id: row.id,
        order_number: row.order_number,
        user_id: row.user_id,
        items,
        subtotal: row.subtotal,
        discount,
        shipping: Shipping {
            method: ShippingMethod::parse(&row.shipping_method)
                .ok_or_else(|| bad_column("shipping_method", &row.shipping_method))?,
            cost: row.shipping_cost,
            carrier: row.carrier,
            tracking_number: row.tracking_number,
        },
        total: row.total,
        shipping_address: row.shipping_address.0,
        billing_address: row.billing_address.map(|a| a.0),
        payment: PaymentInfo {
            method: PaymentMethod::parse(&row.payment_method)
                .ok_or_else(|| bad_column("payment_method", &row.payment_method))?,
            status: PaymentStatus::parse(&row.payment_status)
                .ok_or_else(|| bad_column("payment_status", &row.payment_status))?,
        },
        status: OrderStatus::parse(&row.status).ok_or_else(|| bad_column("status", &row.status))?,
        history,
        customer_note: row.customer_note,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn item_from_row(row: OrderItemRow) -> LineItem {
    LineItem {
        product_id: row.product_id,
        variant_id: row.variant_id,
        name: row.name,
        sku: row.sku,
        quantity: row.quantity.max(0) as u32,
        unit_price: row.unit_price,
    }
}

fn entry_from_row(row: HistoryRow) -> Result<StatusEntry> {
    Ok(StatusEntry {
        status: OrderStatus::parse(&row.status).ok_or_else(|| bad_column("status", &row.status))?,
        at: row.created_at,
        note: row.note,
    })
}

fn user_from_row(row: UserRow) -> Result<User> {
    Ok(User {
        id: row.id,
        email: row.email,
        full_name: row.full_name,
        role: Role::parse(&row.role).ok_or_else(|| bad_column("role", &row.role))?,
        addresses: row.addresses.0,
        created_at: row.created_at,
    })
}

impl PgStore {
    async fn variants_for(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Variant>>> {
        let rows = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, sku, attributes, price, stock, images \
             FROM product_variants WHERE product_id = ANY($1) ORDER BY position, id",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for row in rows {
            let product_id = row.product_id;
            map.entry(product_id).or_default().push(variant_from_row(row)?);
        }
        Ok(map)
    }

    async fn reviews_for(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Review>>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT product_id, user_id, rating, comment, created_at \
             FROM product_reviews WHERE product_id = ANY($1) ORDER BY created_at",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<Uuid, Vec<Review>> = HashMap::new();
        for row in rows {
            map.entry(row.product_id).or_default().push(review_from_row(row));
        }
        Ok(map)
    }

    /// Explains a failed conditional stock update: the target is either
    /// missing or short on stock.
    async fn stock_failure(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Error {
        let looked_up = match variant_id {
            Some(vid) => sqlx::query_as::<_, (String,)>(
                "SELECT sku FROM product_variants WHERE id = $1 AND product_id = $2",
            )
            .bind(vid)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(|(sku,)| (sku, "variant"))),
            None => sqlx::query_as::<_, (String,)>("SELECT name FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(|(name,)| (name, "product"))),
        };
        match looked_up {
            Ok(Some((name, _))) => Error::InsufficientStock { name },
            Ok(None) if variant_id.is_some() => Error::NotFound("variant"),
            Ok(None) => Error::NotFound("product"),
            Err(err) => Error::from(err),
        }
    }

    async fn orders_from_rows(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id, product_id, variant_id, name, sku, quantity, unit_price \
             FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let history_rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT order_id, status, note, created_at \
             FROM order_status_history WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(item_from_row(row));
        }
        let mut history: HashMap<Uuid, Vec<StatusEntry>> = HashMap::new();
        for row in history_rows {
            history.entry(row.order_id).or_default().push(entry_from_row(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                order_from_row(
                    row,
                    items.remove(&id).unwrap_or_default(),
                    history.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

fn push_product_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, query: &'a ProductQuery) {
    if let Some(category) = query.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = query.min_price {
        qb.push(" AND base_price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND base_price <= ").push_bind(max);
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO products (id, name, description, base_price, category, default_images, \
             status, rating, stock, low_stock_threshold, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.base_price)
        .bind(product.category.as_str())
        .bind(&product.default_images)
        .bind(product.status.as_str())
        .bind(product.rating)
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(&product.tags)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, sku, attributes, price, stock, \
                 images, position) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(variant.id)
            .bind(product.id)
            .bind(variant.sku.as_str())
            .bind(Json(&variant.attributes))
            .bind(variant.price)
            .bind(variant.stock)
            .bind(&variant.images)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if unique_violation(&err) {
                    Error::Validation(format!("sku {} already exists", variant.sku))
                } else {
                    Error::Storage(err)
                }
            })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut variants = self.variants_for(&[id]).await?;
        let mut reviews = self.reviews_for(&[id]).await?;
        Ok(Some(product_from_row(
            row,
            variants.remove(&id).unwrap_or_default(),
            reviews.remove(&id).unwrap_or_default(),
        )?))
    }

    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE 1=1");
        push_product_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let (column, desc) = product_sort(query.sort.as_deref());
        let mut qb = QueryBuilder::new("SELECT * FROM products WHERE 1=1");
        push_product_filters(&mut qb, query);
        qb.push(format!(" ORDER BY {column} {}", if desc { "DESC" } else { "ASC" }));
        qb.push(" LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(((page - 1) * limit) as i64);
        let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut variants = self.variants_for(&ids).await?;
        let mut reviews = self.reviews_for(&ids).await?;
        let data = rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                product_from_row(
                    row,
                    variants.remove(&id).unwrap_or_default(),
                    reviews.remove(&id).unwrap_or_default(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Page { data, total, page })
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query(
            "UPDATE products SET name = $2, description = $3, base_price = $4, category = $5, \
             default_images = $6, status = $7, stock = $8, low_stock_threshold = $9, tags = $10, \
             updated_at = $11 WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.base_price)
        .bind(product.category.as_str())
        .bind(&product.default_images)
        .bind(product.status.as_str())
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(&product.tags)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("product"));
        }
        sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
            .bind(product.id)
            .execute(&mut *tx)
            .await?;
        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, sku, attributes, price, stock, \
                 images, position) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(variant.id)
            .bind(product.id)
            .bind(variant.sku.as_str())
            .bind(Json(&variant.attributes))
            .bind(variant.price)
            .bind(variant.stock)
            .bind(&variant.images)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if unique_violation(&err) {
                    Error::Validation(format!("sku {} already exists", variant.sku))
                } else {
                    Error::Storage(err)
                }
            })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let affected = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("product"));
        }
        Ok(())
    }

    async fn add_review(&self, product_id: Uuid, review: &Review) -> Result<f64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO product_reviews (id, product_id, user_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(review.user_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if foreign_key_violation(&err) {
                Error::NotFound("product")
            } else {
                Error::Storage(err)
            }
        })?;
        let (rating,): (f64,) = sqlx::query_as(
            "UPDATE products SET rating = (SELECT COALESCE(AVG(rating), 0)::float8 \
             FROM product_reviews WHERE product_id = $1), updated_at = now() \
             WHERE id = $1 RETURNING rating",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rating)
    }

    async fn adjust_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        delta: i32,
    ) -> Result<i32> {
        let updated: Option<(i32,)> = match variant_id {
            Some(vid) => {
                sqlx::query_as(
                    "UPDATE product_variants SET stock = stock + $3 \
                     WHERE id = $1 AND product_id = $2 AND stock + $3 >= 0 RETURNING stock",
                )
                .bind(vid)
                .bind(product_id)
                .bind(delta)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "UPDATE products SET stock = stock + $2, updated_at = now() \
                     WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
                )
                .bind(product_id)
                .bind(delta)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        match updated {
            Some((stock,)) => Ok(stock),
            None => Err(self.stock_failure(product_id, variant_id).await),
        }
    }

    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            let quantity = line.quantity as i32;
            let affected = match line.variant_id {
                Some(vid) => sqlx::query(
                    "UPDATE product_variants SET stock = stock - $3 \
                     WHERE id = $1 AND product_id = $2 AND stock >= $3",
                )
                .bind(vid)
                .bind(line.product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected(),
                None => sqlx::query(
                    "UPDATE products SET stock = stock - $2, updated_at = now() \
                     WHERE id = $1 AND stock >= $2",
                )
                .bind(line.product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected(),
            };
            if affected == 0 {
                // Dropping the transaction rolls every prior decrement back.
                let err = self.stock_failure(line.product_id, line.variant_id).await;
                tx.rollback().await?;
                return Err(err);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn release_stock(&self, lines: &[StockLine]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            let quantity = line.quantity as i32;
            let affected = match line.variant_id {
                Some(vid) => sqlx::query(
                    "UPDATE product_variants SET stock = stock + $3 \
                     WHERE id = $1 AND product_id = $2",
                )
                .bind(vid)
                .bind(line.product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected(),
                None => sqlx::query(
                    "UPDATE products SET stock = stock + $2, updated_at = now() WHERE id = $1",
                )
                .bind(line.product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected(),
            };
            if affected == 0 {
                tracing::warn!(
                    product_id = %line.product_id,
                    "stock release skipped a deleted product/variant"
                );
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (id, code, discount_type, discount_amount, minimum_purchase, \
             starts_at, ends_at, max_uses, used_count, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_amount)
        .bind(coupon.minimum_purchase)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.max_uses)
        .bind(coupon.used_count)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                Error::Validation("coupon with this code already exists".into())
            } else {
                Error::Storage(err)
            }
        })?;
        Ok(())
    }

    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(coupon_from_row)
            .transpose()
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(coupon_from_row)
            .transpose()
    }

    async fn coupons(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY code")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(coupon_from_row)
            .collect()
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<()> {
        let affected = sqlx::query(
            "UPDATE coupons SET code = $2, discount_type = $3, discount_amount = $4, \
             minimum_purchase = $5, starts_at = $6, ends_at = $7, max_uses = $8, is_active = $9 \
             WHERE id = $1",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_amount)
        .bind(coupon.minimum_purchase)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.max_uses)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                Error::Validation("coupon with this code already exists".into())
            } else {
                Error::Storage(err)
            }
        })?
        .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("coupon"));
        }
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<()> {
        let affected = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("coupon"));
        }
        Ok(())
    }

    async fn redeem_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE coupons SET used_count = used_count + 1 \
             WHERE id = $1 AND is_active AND starts_at <= $2 AND ends_at >= $2 \
             AND (max_uses IS NULL OR used_count < max_uses)",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, subtotal, coupon_id, \
             discount_amount, shipping_method, shipping_cost, carrier, tracking_number, total, \
             shipping_address, billing_address, payment_method, payment_status, status, \
             customer_note, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.subtotal)
        .bind(order.discount.as_ref().map(|d| d.coupon_id))
        .bind(order.discount.as_ref().map(|d| d.amount).unwrap_or(Decimal::ZERO))
        .bind(order.shipping.method.as_str())
        .bind(order.shipping.cost)
        .bind(&order.shipping.carrier)
        .bind(&order.shipping.tracking_number)
        .bind(order.total)
        .bind(Json(&order.shipping_address))
        .bind(order.billing_address.as_ref().map(Json))
        .bind(order.payment.method.as_str())
        .bind(order.payment.status.as_str())
        .bind(order.status.as_str())
        .bind(&order.customer_note)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, variant_id, name, sku, \
                 quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.name)
            .bind(&item.sku)
            .bind(item.quantity as i32)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }
        for entry in &order.history {
            sqlx::query(
                "INSERT INTO order_status_history (order_id, status, note, created_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order.id)
            .bind(entry.status.as_str())
            .bind(&entry.note)
            .bind(entry.at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(self.orders_from_rows(vec![row]).await?.pop())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.orders_from_rows(rows).await
    }

    async fn orders(&self, page: u32, limit: u32) -> Result<Page<Order>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit as i64)
        .bind(((page - 1) * limit) as i64)
        .fetch_all(&self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { data: self.orders_from_rows(rows).await?, total, page })
    }

    async fn transition_order(
        &self,
        id: Uuid,
        entry: &StatusEntry,
        tracking: Option<&TrackingUpdate>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let affected = match tracking {
            Some(t) => sqlx::query(
                "UPDATE orders SET status = $2, carrier = $3, tracking_number = $4, \
                 updated_at = $5 WHERE id = $1",
            )
            .bind(id)
            .bind(entry.status.as_str())
            .bind(&t.carrier)
            .bind(&t.tracking_number)
            .bind(entry.at)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            None => sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(entry.status.as_str())
                .bind(entry.at)
                .execute(&mut *tx)
                .await?
                .rows_affected(),
        };
        if affected == 0 {
            tx.rollback().await?;
            return Err(Error::NotFound("order"));
        }
        sqlx::query(
            "INSERT INTO order_status_history (order_id, status, note, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(entry.status.as_str())
        .bind(&entry.note)
        .bind(entry.at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, full_name, role, addresses, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(Json(&user.addresses))
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                Error::Validation("user with this email already exists".into())
            } else {
                Error::Storage(err)
            }
        })?;
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(user_from_row)
            .transpose()
    }

    async fn add_address(&self, user_id: Uuid, address: &Address) -> Result<()> {
        let affected =
            sqlx::query("UPDATE users SET addresses = addresses || $2 WHERE id = $1")
                .bind(user_id)
                .bind(Json(address))
                .execute(&self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }

    async fn cart(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartRow>(
            "SELECT product_id, variant_id, quantity FROM cart_items \
             WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| CartItem {
                product_id: row.product_id,
                variant_id: row.variant_id,
                quantity: row.quantity.max(0) as u32,
            })
            .collect())
    }

    async fn add_cart_item(&self, user_id: Uuid, item: &CartItem) -> Result<()> {
        if let Some(vid) = item.variant_id {
            let (exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM product_variants WHERE id = $1 AND product_id = $2)",
            )
            .bind(vid)
            .bind(item.product_id)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Err(Error::NotFound("variant"));
            }
        }
        let affected = sqlx::query(
            "UPDATE cart_items SET quantity = quantity + $4 \
             WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3",
        )
        .bind(user_id)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(item.quantity as i32)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            sqlx::query(
                "INSERT INTO cart_items (user_id, product_id, variant_id, quantity) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.quantity as i32)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if foreign_key_violation(&err) {
                    Error::NotFound("product")
                } else {
                    Error::Storage(err)
                }
            })?;
        }
        Ok(())
    }

    async fn set_cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<()> {
        if quantity == 0 {
            return self.remove_cart_item(user_id, product_id, variant_id).await;
        }
        let affected = sqlx::query(
            "UPDATE cart_items SET quantity = $4 \
             WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(quantity as i32)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<()> {
        let affected = sqlx::query(
            "DELETE FROM cart_items \
             WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(variant_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT product_id FROM wishlist_items WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO wishlist_items (user_id, product_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if foreign_key_violation(&err) {
                Error::NotFound("product")
            } else {
                Error::Storage(err)
            }
        })?;
        Ok(())
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let affected =
            sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound("wishlist item"));
        }
        Ok(())
    }
}
