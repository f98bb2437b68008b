//! # Invoice Derivation
//!
//! Everything about an invoice that can be computed without a database:
//! the series name, the invoice id, header totals, per-line VAT and the
//! payment summary blob.
//!
//! ## Header From Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Allocation { covered_total: 3.00, extra_total: 2.50 }   VAT 10%        │
//! │                                                                         │
//! │  final_total     = extra_total               = 2.50   (cash payable)   │
//! │  taxable_base    = round(2.50 / 1.10)        = 2.27                     │
//! │  vat_amount      = final_total - base        = 0.23                     │
//! │  discount_amount = covered_total             = 3.00   (pass absorbed)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocation::Allocation;
use crate::money::Money;
use crate::types::{PaymentInput, TaxRate};
use crate::MIN_IDEMPOTENCY_KEY_LEN;

/// Prefix used when a store has none configured.
pub const DEFAULT_INVOICE_PREFIX: &str = "S1";

/// Simplified invoice (ticket) type.
pub const INVOICE_TYPE_SIMPLIFIED: &str = "F2";

/// Namespace for invoice ids derived from idempotency keys.
pub const INVOICE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d4e_8a3b_4c5d_9e7f_0a1b_2c3d_4e5f);

// =============================================================================
// Series
// =============================================================================

/// Builds the series key for a prefix and two-digit year.
///
/// ## Example
/// ```rust
/// use passbook_core::invoice::series_for;
///
/// assert_eq!(series_for("S1", 25), "S1Y25");
/// assert_eq!(series_for("  ", 7), "S1Y07");
/// ```
pub fn series_for(prefix: &str, two_digit_year: u32) -> String {
    format!("{}Y{:02}", effective_prefix(prefix), two_digit_year % 100)
}

/// The prefix actually used for a store's counter row.
pub fn effective_prefix(prefix: &str) -> &str {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        DEFAULT_INVOICE_PREFIX
    } else {
        prefix
    }
}

// =============================================================================
// Invoice Identity
// =============================================================================

/// Returns the idempotency key if it is long enough to be honored.
pub fn honored_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim)
        .filter(|k| k.chars().count() >= MIN_IDEMPOTENCY_KEY_LEN)
}

/// Resolves the invoice id for a request.
///
/// ```text
/// key (>= 32 chars) that is a UUID  ──► that UUID
/// key (>= 32 chars), anything else  ──► UUID v5(namespace, key)
/// no key / short key                ──► fresh UUID v4
/// ```
///
/// The same key always yields the same id, so a retry collides with the
/// invoice primary key instead of creating a second invoice.
pub fn resolve_invoice_id(key: Option<&str>) -> Uuid {
    match honored_key(key) {
        Some(key) => Uuid::parse_str(key)
            .unwrap_or_else(|_| Uuid::new_v5(&INVOICE_ID_NAMESPACE, key.as_bytes())),
        None => Uuid::new_v4(),
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Invoice header amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub taxable_base: Money,
    pub vat_amount: Money,
    pub discount_amount: Money,
    pub final_total: Money,
}

impl InvoiceTotals {
    /// Derives header amounts from an allocation (see module docs).
    pub fn from_allocation(allocation: &Allocation, rate: TaxRate) -> Self {
        let final_total = allocation.extra_total;
        let (taxable_base, vat_amount) = final_total.split_inclusive_vat(rate);
        InvoiceTotals {
            taxable_base,
            vat_amount,
            discount_amount: allocation.covered_total,
            final_total,
        }
    }
}

/// VAT split of a single unit price: `(unit_taxable_base, unit_vat)`.
pub fn unit_tax(unit_price: Money, rate: TaxRate) -> (Money, Money) {
    unit_price.split_inclusive_vat(rate)
}

/// Maps a unit index onto a line item, clamped to the last line.
///
/// Returns `None` only when there are no lines at all.
pub fn line_for_unit(unit_index: usize, line_count: usize) -> Option<usize> {
    if line_count == 0 {
        None
    } else {
        Some(unit_index.min(line_count - 1))
    }
}

// =============================================================================
// Payment Summary
// =============================================================================

/// Payment summary blob stored on the invoice header.
///
/// ```json
/// {"pass_covered": 300, "total": 250, "by_method": {"cash": 250}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    /// Cents absorbed by the pass.
    pub pass_covered: i64,
    /// Cents tendered across all methods.
    pub total: i64,
    /// Cents per lowercased method name.
    pub by_method: BTreeMap<String, i64>,
}

impl PaymentSummary {
    /// Aggregates tenders by method; blank methods and non-positive amounts are skipped.
    pub fn build(payments: &[PaymentInput], covered: Money) -> Self {
        let mut by_method = BTreeMap::new();
        for payment in payments {
            let method = payment.method.trim().to_lowercase();
            if method.is_empty() || payment.amount_cents <= 0 {
                continue;
            }
            *by_method.entry(method).or_insert(0) += payment.amount_cents;
        }

        PaymentSummary {
            pass_covered: covered.cents(),
            total: by_method.values().sum(),
            by_method,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "pass_covered": self.pass_covered,
            "total": self.total,
            "by_method": self.by_method,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
