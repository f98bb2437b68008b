//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing per-drink coverage in floats:                                 │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every price, coverage and total is an i64 count of cents.           │
//! │    Sums are exact, so covered_total + extra_total == cart total.       │
//! │    The ONLY division in the ledger is the VAT split, and it rounds     │
//! │    explicitly (see `split_inclusive_vat`).                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use passbook_core::money::Money;
//!
//! let price = Money::from_cents(350); // 3.50
//! let coverage = Money::from_cents(300);
//!
//! assert_eq!(price.min(coverage).cents(), 300);
//! assert_eq!((price - coverage).cents(), 50);
//! assert_eq!(price.to_string(), "3.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: subtraction never wraps, negative values are representable
///   even though the ledger never stores them
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  CartLine.unit_price_cents ──► CartUnit.unit_price                      │
/// │                                     │                                   │
/// │  Pass.unit_allocated_base ──────────┤                                   │
/// │                                     ▼                                   │
/// │                      UnitAllocation { covered, extra }                  │
/// │                                     │                                   │
/// │              covered_total ──► invoice.discount_amount                  │
/// │              extra_total   ──► invoice.final_total ──► VAT split        │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use passbook_core::money::Money;
    ///
    /// let price = Money::from_cents(350); // Represents 3.50
    /// assert_eq!(price.cents(), 350);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Returns the larger of two amounts.
    #[inline]
    pub fn max(self, other: Money) -> Money {
        Money(self.0.max(other.0))
    }

    /// Subtracts, flooring the result at zero.
    ///
    /// ## Example
    /// ```rust
    /// use passbook_core::money::Money;
    ///
    /// let price = Money::from_cents(250);
    /// assert_eq!(price.saturating_sub_to_zero(Money::from_cents(300)).cents(), 0);
    /// ```
    #[inline]
    pub fn saturating_sub_to_zero(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Splits a VAT-inclusive amount into `(taxable_base, vat_amount)`.
    ///
    /// ## Rounding Policy: Half Away From Zero
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  taxable_base = round(amount / (1 + rate))   ← rounded to the cent │
    /// │  vat_amount   = amount - taxable_base         ← exact remainder    │
    /// │                                                                     │
    /// │  x.5 cents rounds AWAY from zero:  2.5 → 3,  -2.5 → -3             │
    /// │                                                                     │
    /// │  Because vat is the remainder, base + vat == amount ALWAYS.        │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use passbook_core::money::Money;
    /// use passbook_core::types::TaxRate;
    ///
    /// // 2.50 including 10% VAT = 2.27 base + 0.23 VAT
    /// let (base, vat) = Money::from_cents(250).split_inclusive_vat(TaxRate::from_bps(1000));
    /// assert_eq!(base.cents(), 227);
    /// assert_eq!(vat.cents(), 23);
    /// ```
    pub fn split_inclusive_vat(&self, rate: TaxRate) -> (Money, Money) {
        // i128 keeps amount * 10000 from overflowing on large totals
        let base = div_round_half_away(
            self.0 as i128 * 10_000,
            10_000 + rate.bps() as i128,
        );
        let base = Money::from_cents(base as i64);
        (base, *self - base)
    }
}

/// Integer division rounding half away from zero. `den` must be positive.
fn div_round_half_away(num: i128, den: i128) -> i128 {
    if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((-2 * num + den) / (2 * den))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows a plain two-decimal amount ("3.50", "-5.50").
///
/// ## Note
/// This is the format written into invoice blobs and logs.
/// Currency symbols are a presentation concern of the request layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
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
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(3, 50).cents(), 350);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(350).to_string(), "3.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_min_max_and_floor() {
        let a = Money::from_cents(350);
        let b = Money::from_cents(300);
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
        assert_eq!(b.saturating_sub_to_zero(a), Money::zero());
        assert_eq!(a.saturating_sub_to_zero(b).cents(), 50);
    }

    #[test]
    fn test_sum() {
        let amounts = [Money::from_cents(300), Money::from_cents(50), Money::from_cents(200)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total.cents(), 550);
    }

    #[test]
    fn test_vat_split_keeps_total() {
        let rate = TaxRate::from_bps(1000);
        for cents in [0, 1, 99, 250, 1099, 123_456] {
            let amount = Money::from_cents(cents);
            let (base, vat) = amount.split_inclusive_vat(rate);
            assert_eq!(base + vat, amount);
        }
    }

    #[test]
    fn test_vat_split_rounds_half_away_from_zero() {
        // 100% VAT halves the amount: 0.05 → 0.025 → 0.03 (banker's would give 0.02)
        let rate = TaxRate::from_bps(10_000);
        let (base, vat) = Money::from_cents(5).split_inclusive_vat(rate);
        assert_eq!(base.cents(), 3);
        assert_eq!(vat.cents(), 2);

        let (base, _) = Money::from_cents(1).split_inclusive_vat(rate);
        assert_eq!(base.cents(), 1);

        let (base, vat) = Money::from_cents(-5).split_inclusive_vat(rate);
        assert_eq!(base.cents(), -3);
        assert_eq!(vat.cents(), -2);
    }

    #[test]
    fn test_vat_split_zero_rate() {
        let (base, vat) = Money::from_cents(250).split_inclusive_vat(TaxRate::zero());
        assert_eq!(base.cents(), 250);
        assert!(vat.is_zero());
    }
}
