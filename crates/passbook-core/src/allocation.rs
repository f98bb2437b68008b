//! # Allocation Engine
//!
//! Splits the cost of a cart between a pass and cash.
//!
//! ## First-N-Units Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cart:  [ tea 3.50 x1 ]  [ coffee 2.00 x1 ]      coverage 3.00, uses 1 │
//! │                                                                         │
//! │  expand ─► unit 0 (line 0) 3.50    unit 1 (line 1) 2.00                 │
//! │                                                                         │
//! │  unit 0: covered = min(3.50, 3.00) = 3.00   extra = 0.50   ◄ covered   │
//! │  unit 1: covered = 0                        extra = 2.00   ◄ cash      │
//! │                                                                         │
//! │  covered_total = 3.00        extra_total = 2.50                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first `uses` units in cart order are covered, whatever their price.
//! Cheaper units are NOT picked first.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::CartLine;

// =============================================================================
// Cart Units
// =============================================================================

/// A single purchasable unit expanded from a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartUnit {
    /// Index of the cart line this unit came from.
    pub line_index: usize,
    pub unit_price: Money,
}

impl CartUnit {
    pub fn new(line_index: usize, unit_price: Money) -> Self {
        CartUnit {
            line_index,
            unit_price,
        }
    }
}

/// Expands each cart line into `quantity` units, preserving cart order.
///
/// A quantity below 1 still yields one unit.
///
/// ## Example
/// ```rust
/// use passbook_core::allocation::expand_units;
/// use passbook_core::types::CartLine;
///
/// let line = CartLine {
///     product_id: 1,
///     variant_id: None,
///     display_name: "Jasmine tea".to_string(),
///     name_zh: None,
///     name_es: None,
///     variant_name: None,
///     variant_name_zh: None,
///     variant_name_es: None,
///     quantity: 3,
///     unit_price_cents: 300,
///     addons: serde_json::Value::Null,
/// };
/// assert_eq!(expand_units(&[line]).len(), 3);
/// ```
pub fn expand_units(cart: &[CartLine]) -> Vec<CartUnit> {
    cart.iter()
        .enumerate()
        .flat_map(|(index, line)| {
            let unit = CartUnit::new(index, line.unit_price());
            std::iter::repeat(unit).take(line.quantity.max(1) as usize)
        })
        .collect()
}

// =============================================================================
// Allocation Result
// =============================================================================

/// Coverage applied to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAllocation {
    /// Position of the unit in the expanded cart.
    pub unit_index: usize,
    pub line_index: usize,
    pub unit_price: Money,
    pub covered: Money,
    pub extra: Money,
}

/// Result of splitting a cart between pass coverage and cash.
///
/// ## Invariants
/// - `covered_total + extra_total == sum(unit prices)`
/// - every `covered <= coverage_per_use`
/// - only the first `uses` units have non-zero `covered`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub per_unit: Vec<UnitAllocation>,
    pub covered_total: Money,
    pub extra_total: Money,
}

impl Allocation {
    /// Number of units that received coverage candidates.
    pub fn covered_units(&self) -> usize {
        self.per_unit.iter().filter(|u| u.covered.is_positive()).count()
    }

    /// Sum of every unit's price.
    pub fn cart_total(&self) -> Money {
        self.covered_total + self.extra_total
    }
}

// =============================================================================
// Allocate
// =============================================================================

/// Allocates `uses` pass uses of `coverage_per_use` across `units`.
///
/// Pure and deterministic: no clock, no randomness, no I/O.
/// A negative `uses` covers nothing.
pub fn allocate(units: &[CartUnit], coverage_per_use: Money, uses: i64) -> Allocation {
    let candidates = uses.clamp(0, units.len() as i64) as usize;
    let coverage = coverage_per_use.max(Money::zero());

    let per_unit: Vec<UnitAllocation> = units
        .iter()
        .enumerate()
        .map(|(unit_index, unit)| {
            let covered = if unit_index < candidates {
                unit.unit_price.min(coverage).max(Money::zero())
            } else {
                Money::zero()
            };
            UnitAllocation {
                unit_index,
                line_index: unit.line_index,
                unit_price: unit.unit_price,
                covered,
                extra: unit.unit_price.saturating_sub_to_zero(covered),
            }
        })
        .collect();

    let covered_total = per_unit.iter().map(|u| u.covered).sum();
    let extra_total = per_unit.iter().map(|u| u.extra).sum();

    Allocation {
        per_unit,
        covered_total,
        extra_total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, qty: i64) -> CartLine {
        CartLine {
            product_id: 1,
            variant_id: None,
            display_name: "Drink".to_string(),
            name_zh: None,
            name_es: None,
            variant_name: None,
            variant_name_zh: None,
            variant_name_es: None,
            quantity: qty,
            unit_price_cents: price,
            addons: serde_json::Value::Null,
        }
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_tea_and_coffee_scenario() {
        let units = expand_units(&[line(350, 1), line(200, 1)]);
        let split = allocate(&units, cents(300), 1);

        assert_eq!(split.per_unit[0].covered, cents(300));
        assert_eq!(split.per_unit[0].extra, cents(50));
        assert_eq!(split.per_unit[1].covered, Money::zero());
        assert_eq!(split.per_unit[1].extra, cents(200));
        assert_eq!(split.covered_total, cents(300));
        assert_eq!(split.extra_total, cents(250));
    }

    #[test]
    fn test_expand_keeps_line_index_and_order() {
        let units = expand_units(&[line(300, 2), line(150, 1)]);
        let indexes: Vec<usize> = units.iter().map(|u| u.line_index).collect();
        assert_eq!(indexes, vec![0, 0, 1]);
        assert_eq!(units[2].unit_price, cents(150));
    }

    #[test]
    fn test_expand_floors_quantity_at_one() {
        assert_eq!(expand_units(&[line(300, 0)]).len(), 1);
    }

    #[test]
    fn test_cart_order_not_price_order() {
        // The cheap unit comes last, so it stays cash-only
        let units = expand_units(&[line(500, 1), line(450, 1), line(100, 1)]);
        let split = allocate(&units, cents(300), 2);
        assert_eq!(split.per_unit[0].covered, cents(300));
        assert_eq!(split.per_unit[1].covered, cents(300));
        assert_eq!(split.per_unit[2].covered, Money::zero());
        assert_eq!(split.covered_units(), 2);
    }

    #[test]
    fn test_cheap_unit_is_fully_covered() {
        let units = expand_units(&[line(250, 1)]);
        let split = allocate(&units, cents(300), 1);
        assert_eq!(split.covered_total, cents(250));
        assert_eq!(split.extra_total, Money::zero());
    }

    #[test]
    fn test_uses_beyond_units_are_ignored() {
        let units = expand_units(&[line(350, 1)]);
        let split = allocate(&units, cents(300), 5);
        assert_eq!(split.covered_total, cents(300));
        assert_eq!(split.per_unit.len(), 1);
    }

    #[test]
    fn test_conservation_and_no_double_coverage() {
        let cart = [line(350, 2), line(0, 1), line(275, 3), line(1299, 1)];
        let units = expand_units(&cart);
        let total: Money = units.iter().map(|u| u.unit_price).sum();

        for uses in 0..=units.len() as i64 {
            let split = allocate(&units, cents(300), uses);
            assert_eq!(split.cart_total(), total);
            for u in &split.per_unit {
                assert!(u.covered <= cents(300));
                assert_eq!(u.covered + u.extra, u.unit_price);
                if u.unit_index >= uses as usize {
                    assert!(u.covered.is_zero());
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let units = expand_units(&[line(350, 2), line(200, 1)]);
        assert_eq!(allocate(&units, cents(300), 2), allocate(&units, cents(300), 2));
    }
}
