//! Coupons and discount evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(DiscountType::Percentage),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub minimum_purchase: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// `None` means unlimited uses.
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
}

impl Coupon {
    /// Codes are matched case-insensitively; the canonical form is uppercase.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Whether the coupon can still be applied at `now`: active, inside its
    /// validity window, and under its usage cap.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at <= now
            && now <= self.ends_at
            && self.max_uses.map_or(true, |max| self.used_count < max)
    }

    /// Discount for a subtotal. Percentage coupons take their share of the
    /// subtotal, fixed coupons apply their flat amount. The result is floored
    /// at zero but deliberately not capped to the subtotal: a fixed coupon
    /// larger than the subtotal yields a negative order total.
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let amount = match self.discount_type {
            DiscountType::Percentage => subtotal * self.discount_amount / Decimal::ONE_HUNDRED,
            DiscountType::Fixed => self.discount_amount,
        };
        amount.max(Decimal::ZERO)
    }
}

/// Evaluate a looked-up coupon against a subtotal. The caller fetches by
/// normalized code; a missing, inactive, out-of-window or used-up coupon is
/// reported uniformly so the response does not leak which check failed.
pub fn evaluate(
    coupon: Option<Coupon>,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(Coupon, Decimal)> {
    let coupon = coupon
        .filter(|c| c.is_redeemable(now))
        .ok_or(Error::CouponInvalid)?;
    if subtotal < coupon.minimum_purchase {
        return Err(Error::BelowMinimum { minimum: coupon.minimum_purchase });
    }
    let amount = coupon.discount_for(subtotal);
    Ok((coupon, amount))
}
