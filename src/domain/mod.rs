//! Domain model: catalog, coupons, orders, users.

pub mod coupon;
pub mod order;
pub mod product;
pub mod user;

pub use coupon::{evaluate, Coupon, DiscountType};
pub use order::{
    Discount, LineItem, Order, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus, Shipping,
    ShippingMethod, StatusEntry, TrackingUpdate,
};
pub use product::{Category, Product, ProductStatus, Review, Sku, Variant, VariantAttributes};
pub use user::{Address, CartItem, Principal, Role, User};
