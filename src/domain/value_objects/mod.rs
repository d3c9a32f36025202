//! Value Objects for the storefront
//!
//! Currency amounts are carried as integer minor units (cents) so that sums
//! across line items never drift. Every checkout path prices through the
//! functions in this module.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounds a decimal currency amount to integer minor units.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Formats minor units with exactly two fractional digits.
pub fn to_decimal_string(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Minor units as a two-place `Decimal`.
pub fn to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Anything that can be priced as a line: a unit price and a quantity that
/// may be missing or unusable.
pub trait Priced {
    fn unit_price(&self) -> f64;
    fn quantity(&self) -> Option<u32>;

    /// Quantity used for pricing: never below one.
    fn billable_quantity(&self) -> u32 {
        self.quantity().unwrap_or(1).max(1)
    }
}

/// Sum of `round(price * 100) * max(1, qty)` over the items; `None` when it
/// does not fit in an `i64`.
pub fn sum_line_items<T: Priced>(items: &[T]) -> Option<i64> {
    items.iter().try_fold(0i64, |acc, i| {
        to_minor_units(i.unit_price()).checked_mul(i64::from(i.billable_quantity()))?.checked_add(acc)
    })
}

/// Items subtotal plus the flat delivery fee, both in minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown { pub items_minor: i64, pub shipping_minor: i64 }

impl PriceBreakdown {
    /// `None` when the subtotal or the total leaves the `i64` range.
    pub fn compute<T: Priced>(items: &[T], shipping_minor: i64) -> Option<Self> {
        let items_minor = sum_line_items(items)?;
        items_minor.checked_add(shipping_minor)?;
        Some(Self { items_minor, shipping_minor })
    }
    pub fn total_minor(&self) -> i64 { self.items_minor + self.shipping_minor }
}

/// Amount in minor units tagged with a lowercase currency code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Money { minor: i64, currency: String }

impl Money {
    pub fn from_minor(minor: i64, currency: &str) -> Self { Self { minor, currency: currency.to_lowercase() } }
    pub fn from_amount(amount: f64, currency: &str) -> Self { Self::from_minor(to_minor_units(amount), currency) }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn to_decimal_string(&self) -> String { to_decimal_string(self.minor) }
}

/// Review rating, an integer in 1..=5
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Result<Self, RatingError> {
        if (1..=5).contains(&value) { Ok(Self(value)) } else { Err(RatingError) }
    }

    /// Parses form input: digits only, surrounding whitespace allowed.
    pub fn parse(raw: &str) -> Result<Self, RatingError> {
        let value: f64 = raw.trim().parse().map_err(|_| RatingError)?;
        if value.fract() != 0.0 || !(1.0..=5.0).contains(&value) { return Err(RatingError); }
        Self::new(value as u8)
    }

    pub fn value(&self) -> u8 { self.0 }
}

impl TryFrom<u8> for Rating { type Error = RatingError; fn try_from(v: u8) -> Result<Self, RatingError> { Self::new(v) } }
impl From<Rating> for u8 { fn from(r: Rating) -> u8 { r.0 } }

#[derive(Debug, Clone, PartialEq, Eq)] pub struct RatingError;
impl std::error::Error for RatingError {}
impl fmt::Display for RatingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Rating 1..5 required") }
}
