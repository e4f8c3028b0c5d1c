//! In-memory store. Mirrors the Postgres semantics — including the
//! all-or-nothing stock reservation and the conditional coupon redeem — with
//! a single mutex standing in for single-statement atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Address, CartItem, Coupon, Order, Product, Review, StatusEntry, TrackingUpdate, User,
};
use crate::error::{Error, Result};

use super::{
    product_sort, CouponStore, OrderStore, Page, ProductQuery, ProductStore, StockLine, UserStore,
};

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    coupons: HashMap<Uuid, Coupon>,
    orders: HashMap<Uuid, Order>,
    users: HashMap<Uuid, User>,
    carts: HashMap<Uuid, Vec<CartItem>>,
    wishlists: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(store: &MemStore) -> std::sync::MutexGuard<'_, Inner> {
    store.inner.lock().expect("store mutex poisoned")
}

/// Validates one stock movement against the current state without applying
/// it.
fn check_line(products: &HashMap<Uuid, Product>, line: &StockLine) -> Result<()> {
    let product = products
        .get(&line.product_id)
        .ok_or(Error::NotFound("product"))?;
    match line.variant_id {
        Some(vid) => {
            let variant = product.variant(vid).ok_or(Error::NotFound("variant"))?;
            if variant.stock < line.quantity as i32 {
                return Err(Error::InsufficientStock { name: variant.sku.to_string() });
            }
        }
        None => {
            if product.stock < line.quantity as i32 {
                return Err(Error::InsufficientStock { name: product.name.clone() });
            }
        }
    }
    Ok(())
}

fn apply_line(products: &mut HashMap<Uuid, Product>, line: &StockLine, delta: i32) {
    let Some(product) = products.get_mut(&line.product_id) else {
        tracing::warn!(product_id = %line.product_id, "stock release skipped a deleted product");
        return;
    };
    match line.variant_id {
        Some(vid) => {
            if let Some(variant) = product.variants.iter_mut().find(|v| v.id == vid) {
                variant.stock += delta;
            } else {
                tracing::warn!(variant_id = %vid, "stock release skipped a deleted variant");
            }
        }
        None => product.stock += delta,
    }
}

#[async_trait]
impl ProductStore for MemStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        lock(self).products.insert(product.id, product.clone());
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(lock(self).products.get(&id).cloned())
    }

    async fn products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100) as usize;
        let inner = lock(self);
        let mut matches: Vec<Product> = inner
            .products
            .values()
            .filter(|p| query.category.map_or(true, |c| p.category == c))
            .filter(|p| {
                query.search.as_deref().map_or(true, |s| {
                    let needle = s.to_lowercase();
                    p.name.to_lowercase().contains(&needle)
                        || p.description.to_lowercase().contains(&needle)
                })
            })
            .filter(|p| query.min_price.map_or(true, |min| p.base_price >= min))
            .filter(|p| query.max_price.map_or(true, |max| p.base_price <= max))
            .cloned()
            .collect();
        let (column, desc) = product_sort(query.sort.as_deref());
        matches.sort_by(|a, b| {
            let ord = match column {
                "name" => a.name.cmp(&b.name),
                "base_price" => a.base_price.cmp(&b.base_price),
                "rating" => a.rating.total_cmp(&b.rating),
                _ => a.created_at.cmp(&b.created_at),
            };
            if desc {
                ord.reverse()
            } else {
                ord
            }
        });
        let total = matches.len() as i64;
        let data = matches
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(Page { data, total, page })
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut inner = lock(self);
        if !inner.products.contains_key(&product.id) {
            return Err(Error::NotFound("product"));
        }
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        lock(self)
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("product"))
    }

    async fn add_review(&self, product_id: Uuid, review: &Review) -> Result<f64> {
        let mut inner = lock(self);
        let product = inner
            .products
            .get_mut(&product_id)
            .ok_or(Error::NotFound("product"))?;
        product.reviews.push(review.clone());
        product.rating = Product::average_rating(&product.reviews);
        product.updated_at = Utc::now();
        Ok(product.rating)
    }

    async fn adjust_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        delta: i32,
    ) -> Result<i32> {
        let mut inner = lock(self);
        let product = inner
            .products
            .get_mut(&product_id)
            .ok_or(Error::NotFound("product"))?;
        let (stock, name) = match variant_id {
            Some(vid) => {
                let variant = product
                    .variants
                    .iter_mut()
                    .find(|v| v.id == vid)
                    .ok_or(Error::NotFound("variant"))?;
                let name = variant.sku.to_string();
                (&mut variant.stock, name)
            }
            None => {
                let name = product.name.clone();
                (&mut product.stock, name)
            }
        };
        if *stock + delta < 0 {
            return Err(Error::InsufficientStock { name });
        }
        *stock += delta;
        Ok(*stock)
    }

    async fn reserve_stock(&self, lines: &[StockLine]) -> Result<()> {
        let mut inner = lock(self);
        for line in lines {
            check_line(&inner.products, line)?;
        }
        for line in lines {
            apply_line(&mut inner.products, line, -(line.quantity as i32));
        }
        Ok(())
    }

    async fn release_stock(&self, lines: &[StockLine]) -> Result<()> {
        let mut inner = lock(self);
        for line in lines {
            apply_line(&mut inner.products, line, line.quantity as i32);
        }
        Ok(())
    }
}

#[async_trait]
impl CouponStore for MemStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut inner = lock(self);
        if inner.coupons.values().any(|c| c.code == coupon.code) {
            return Err(Error::Validation("coupon with this code already exists".into()));
        }
        inner.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn coupon(&self, id: Uuid) -> Result<Option<Coupon>> {
        Ok(lock(self).coupons.get(&id).cloned())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(lock(self).coupons.values().find(|c| c.code == code).cloned())
    }

    async fn coupons(&self) -> Result<Vec<Coupon>> {
        let mut all: Vec<Coupon> = lock(self).coupons.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut inner = lock(self);
        if inner
            .coupons
            .values()
            .any(|c| c.id != coupon.id && c.code == coupon.code)
        {
            return Err(Error::Validation("coupon with this code already exists".into()));
        }
        if !inner.coupons.contains_key(&coupon.id) {
            return Err(Error::NotFound("coupon"));
        }
        inner.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<()> {
        lock(self)
            .coupons
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("coupon"))
    }

    async fn redeem_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = lock(self);
        let Some(coupon) = inner.coupons.get_mut(&id) else {
            return Ok(false);
        };
        if !coupon.is_redeemable(now) {
            return Ok(false);
        }
        coupon.used_count += 1;
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for MemStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        lock(self).orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(lock(self).orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = lock(self)
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders(&self, page: u32, limit: u32) -> Result<Page<Order>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100) as usize;
        let mut all: Vec<Order> = lock(self).orders.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let data = all
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(Page { data, total, page })
    }

    async fn transition_order(
        &self,
        id: Uuid,
        entry: &StatusEntry,
        tracking: Option<&TrackingUpdate>,
    ) -> Result<()> {
        let mut inner = lock(self);
        let order = inner.orders.get_mut(&id).ok_or(Error::NotFound("order"))?;
        order.status = entry.status;
        order.updated_at = entry.at;
        if let Some(t) = tracking {
            order.shipping.carrier = Some(t.carrier.clone());
            order.shipping.tracking_number = Some(t.tracking_number.clone());
        }
        order.history.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        lock(self).users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(lock(self).users.get(&id).cloned())
    }

    async fn add_address(&self, user_id: Uuid, address: &Address) -> Result<()> {
        let mut inner = lock(self);
        let user = inner.users.get_mut(&user_id).ok_or(Error::NotFound("user"))?;
        user.addresses.push(address.clone());
        Ok(())
    }

    async fn cart(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        Ok(lock(self).carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_cart_item(&self, user_id: Uuid, item: &CartItem) -> Result<()> {
        let mut inner = lock(self);
        match inner.products.get(&item.product_id) {
            None => return Err(Error::NotFound("product")),
            Some(product) => {
                if let Some(vid) = item.variant_id {
                    if product.variant(vid).is_none() {
                        return Err(Error::NotFound("variant"));
                    }
                }
            }
        }
        let cart = inner.carts.entry(user_id).or_default();
        if let Some(existing) = cart
            .iter_mut()
            .find(|c| c.product_id == item.product_id && c.variant_id == item.variant_id)
        {
            existing.quantity += item.quantity;
        } else {
            cart.push(item.clone());
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
        let mut inner = lock(self);
        let cart = inner.carts.entry(user_id).or_default();
        let item = cart
            .iter_mut()
            .find(|c| c.product_id == product_id && c.variant_id == variant_id)
            .ok_or(Error::NotFound("cart item"))?;
        item.quantity = quantity;
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<()> {
        let mut inner = lock(self);
        let cart = inner.carts.entry(user_id).or_default();
        let before = cart.len();
        cart.retain(|c| !(c.product_id == product_id && c.variant_id == variant_id));
        if cart.len() == before {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        lock(self).carts.remove(&user_id);
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(lock(self).wishlists.get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let mut inner = lock(self);
        if !inner.products.contains_key(&product_id) {
            return Err(Error::NotFound("product"));
        }
        let list = inner.wishlists.entry(user_id).or_default();
        if !list.contains(&product_id) {
            list.push(product_id);
        }
        Ok(())
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let mut inner = lock(self);
        let list = inner.wishlists.entry(user_id).or_default();
        let before = list.len();
        list.retain(|id| *id != product_id);
        if list.len() == before {
            return Err(Error::NotFound("wishlist item"));
        }
        Ok(())
    }
}
