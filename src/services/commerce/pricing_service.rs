//! Pure pricing rules: cart totals, minor-unit conversion and the coupon
//! thresholds. Nothing here performs I/O.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::commerce::CouponModel;
use crate::errors::ServiceError;

/// Highest unit price the catalog accepts
pub const MAX_UNIT_PRICE: Decimal = dec!(1000000);

/// Cart subtotal (major units) at which the automatic coupon is offered
pub const AUTO_COUPON_THRESHOLD: Decimal = dec!(200);
pub const AUTO_COUPON_PERCENTAGE: i32 = 10;
pub const AUTO_COUPON_VALIDITY_DAYS: i64 = 7;

/// Pre-discount order amount (minor units) that earns a reward coupon
pub const REWARD_COUPON_THRESHOLD_MINOR: i64 = 20_000;
pub const REWARD_COUPON_PERCENTAGE: i32 = 10;
pub const REWARD_COUPON_VALIDITY_DAYS: i64 = 30;

/// A product id and how many of it are in the cart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartEntry {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    /// Percentage of the coupon that was applied, if any
    pub discount_percentage: Option<i32>,
}

/// Derives subtotal and total for a cart.
///
/// Entries without a catalog price are ignored. The coupon is applied only
/// when it is active and not expired at `now`; the discount is rounded to
/// cents. Fails with InvalidInput when the amounts overflow.
pub fn compute_totals(
    entries: &[CartEntry],
    prices: &HashMap<Uuid, Decimal>,
    coupon: Option<&CouponModel>,
    now: DateTime<Utc>,
) -> Result<Totals, ServiceError> {
    let subtotal = checked_subtotal(
        entries
            .iter()
            .filter_map(|e| prices.get(&e.product_id).map(|p| (*p, e.quantity))),
    )
    .ok_or_else(out_of_range)?;

    let applied = coupon.filter(|c| c.is_usable_at(now));
    let discount = match applied {
        Some(c) => percentage_of(subtotal, c.discount_percentage).ok_or_else(out_of_range)?,
        None => Decimal::ZERO,
    };

    Ok(Totals {
        subtotal,
        discount,
        total: subtotal - discount,
        discount_percentage: applied.map(|c| c.discount_percentage),
    })
}

/// Σ price × quantity, or `None` on overflow
pub fn checked_subtotal<I>(lines: I) -> Option<Decimal>
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines.into_iter().try_fold(Decimal::ZERO, |acc, (price, quantity)| {
        price
            .checked_mul(Decimal::from(quantity))
            .and_then(|line| acc.checked_add(line))
    })
}

fn out_of_range() -> ServiceError {
    ServiceError::InvalidInput("Cart total is out of range".to_string())
}

fn percentage_of(amount: Decimal, percentage: i32) -> Option<Decimal> {
    amount
        .checked_mul(Decimal::from(percentage))
        .and_then(|v| v.checked_div(dec!(100)))
        .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Converts a major-unit price to integer minor units, rounding half away
/// from zero. `None` if the amount does not fit.
pub fn to_minor_units(price: Decimal) -> Option<i64> {
    price
        .checked_mul(dec!(100))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Converts minor units back to a major-unit amount.
pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// `total - round(total * percentage / 100)` in minor units
pub fn apply_percentage_discount_minor(total: i64, percentage: i32) -> i64 {
    let discount = Decimal::from(total) * Decimal::from(percentage) / dec!(100);
    let discount = discount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    total - discount
}

pub fn is_auto_coupon_eligible(subtotal: Decimal) -> bool {
    subtotal >= AUTO_COUPON_THRESHOLD
}

/// How much more must be added to reach the auto-coupon threshold
pub fn amount_needed(subtotal: Decimal) -> Decimal {
    (AUTO_COUPON_THRESHOLD - subtotal).max(Decimal::ZERO)
}

pub fn earns_reward_coupon(pre_discount_minor: i64) -> bool {
    pre_discount_minor >= REWARD_COUPON_THRESHOLD_MINOR
}
