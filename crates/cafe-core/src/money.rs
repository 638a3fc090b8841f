//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A bill is recomputed every time a screen refreshes. Rounding each     │
//! │  intermediate step (discount, every tax line) drifts the grand total.  │
//! │                                                                         │
//! │  OUR SOLUTION: exact decimals, rounded once                             │
//! │    discount ─► taxable ─► tax lines ─► grand total   (full precision)  │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                    rounded() / Display  (2 places)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Arithmetic on the billing path is checked: an amount too large for a
//! `Decimal` comes back as `None` instead of panicking.
//!
//! ## Usage
//! ```rust
//! use cafe_core::money::Money;
//!
//! let price = Money::from_cents(12050); // ₹120.50
//! let line = price.checked_multiply_quantity(3).unwrap(); // ₹361.50
//! assert_eq!(line.to_string(), "₹361.50");
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

/// Presentation precision for every amount shown to a human.
pub const DECIMAL_PLACES: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value held at full decimal precision.
///
/// ## Design Decisions
/// - **Decimal, not float**: prices like `0.1` are exact
/// - **No implicit rounding**: arithmetic keeps every digit; only
///   [`Money::rounded`] and `Display` cut to two places
/// - **Serialized as a JSON number**: order documents keep the familiar
///   `"price": 120.5` shape
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  MenuItem.price ──► OrderLine.unit_price ──► OrderLine.extension        │
/// │                                                    │                    │
/// │                                Batch.subtotal ◄────┘                    │
/// │                                     │                                   │
/// │                                Order.total ──► compute_bill ──► Bill    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(#[ts(type = "number")] Decimal);

impl Money {
    /// Wraps an exact decimal amount.
    #[inline]
    pub const fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Creates a Money value from the smallest currency unit.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.to_string(), "₹10.99");
    /// ```
    #[inline]
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, DECIMAL_PLACES))
    }

    /// Creates a Money value from whole currency units.
    #[inline]
    pub fn from_major(units: i64) -> Self {
        Money(Decimal::from(units))
    }

    /// The exact, unrounded amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Rounds to two places, half away from zero.
    ///
    /// This is the presentation boundary. Never feed a rounded value back
    /// into further billing arithmetic.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let tax = Money::new(Decimal::new(7125, 3)); // 7.125
    /// assert_eq!(tax.rounded(), Money::from_cents(713));
    /// ```
    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// The rounded amount in the smallest currency unit.
    pub fn cents(&self) -> i64 {
        (self.rounded().0 * HUNDRED).to_i64().unwrap_or_default()
    }

    /// `self + other`, or `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(4550);
    /// assert_eq!(unit_price.checked_multiply_quantity(2), Some(Money::from_cents(9100)));
    /// ```
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(qty)).map(Money)
    }

    /// `self × pct / 100`, unrounded. `None` when the product does not fit.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let taxable = Money::from_major(150);
    /// assert_eq!(taxable.checked_percent(Decimal::from(5)), Some(Money::from_cents(750)));
    /// ```
    #[inline]
    pub fn checked_percent(&self, pct: Decimal) -> Option<Money> {
        self.0.checked_mul(pct)?.checked_div(HUNDRED).map(Money)
    }

    /// Sums amounts, stopping at the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Restricts the value to `[min, max]`.
    ///
    /// `max` wins when the bounds cross, so clamping to `[0, subtotal]` with
    /// a negative subtotal never panics.
    pub fn clamp_to(self, min: Money, max: Money) -> Money {
        if self > max {
            max
        } else if self < min {
            min
        } else {
            self
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display renders the rounded amount with two places.
///
/// ## Note
/// This is for receipts and logs. The frontends format from the raw number.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.rounded().0;
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        write!(f, "{}₹{:.2}", sign, rounded.abs())
    }
}

/// Parses plain decimal text such as `"120.5"`.
impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.amount(), Decimal::new(1099, 2));
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "₹10.99");
        assert_eq!(Money::from_major(5).to_string(), "₹5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-₹5.50");
        assert_eq!(Money::zero().to_string(), "₹0.00");
        assert_eq!(Money::new(Decimal::new(-1, 3)).to_string(), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_major(10);
        let b = Money::from_major(5);

        assert_eq!(a + b, Money::from_major(15));
        assert_eq!(a - b, Money::from_major(5));
        assert_eq!(b.checked_multiply_quantity(3), Some(Money::from_major(15)));
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(Money::new(Decimal::new(1005, 3)).rounded(), Money::from_cents(101));
        assert_eq!(Money::new(Decimal::new(-1005, 3)).rounded(), Money::from_cents(-101));
        assert_eq!(Money::new(Decimal::new(1004, 3)).rounded(), Money::from_cents(100));
    }

    #[test]
    fn test_full_precision_until_presentation() {
        // 10 / 3 three times keeps every digit, so the sum rounds back to 10.00
        let third = Money::new(Decimal::from(10) / Decimal::from(3));
        let sum = Money::checked_sum([third, third, third]).unwrap();
        assert_eq!(sum.rounded(), Money::from_major(10));
        assert_ne!(third.rounded().checked_multiply_quantity(3), Some(Money::from_major(10)));
    }

    #[test]
    fn test_percent() {
        let amount = Money::from_major(100);
        assert_eq!(amount.checked_percent(Decimal::from(5)), Some(Money::from_major(5)));
        assert_eq!(amount.checked_percent(Decimal::new(25, 1)), Some(Money::from_cents(250)));
    }

    #[test]
    fn test_overflow_is_reported_not_panicked() {
        let huge = Money::new(Decimal::MAX);
        assert_eq!(huge.checked_add(Money::from_major(1)), None);
        assert_eq!(huge.checked_multiply_quantity(2), None);
        assert_eq!(Money::from_major(1000).checked_percent(Decimal::MAX), None);
        assert_eq!(Money::checked_sum([huge, huge]), None);
        assert_eq!(huge.checked_multiply_quantity(1), Some(huge));
    }

    #[test]
    fn test_clamp_to() {
        let zero = Money::zero();
        let cap = Money::from_major(100);
        assert_eq!(Money::from_major(150).clamp_to(zero, cap), cap);
        assert_eq!(Money::from_major(-3).clamp_to(zero, cap), zero);
        assert_eq!(Money::from_major(40).clamp_to(zero, cap), Money::from_major(40));
    }

    #[test]
    fn test_parse() {
        assert_eq!("120.5".parse::<Money>().unwrap(), Money::from_cents(12050));
        assert_eq!(" 7 ".parse::<Money>().unwrap(), Money::from_major(7));
        assert!("seven".parse::<Money>().is_err());
    }

    #[test]
    fn test_json_is_a_number() {
        let json = serde_json::to_string(&Money::from_cents(15750)).unwrap();
        assert_eq!(json, "157.5");
        let back: Money = serde_json::from_str("157.5").unwrap();
        assert_eq!(back, Money::from_cents(15750));
    }
}
