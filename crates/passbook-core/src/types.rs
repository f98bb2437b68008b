//! # Domain Types
//!
//! Core domain types used throughout Passbook.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Pass       │   │   StoreConfig   │   │ OperatorContext │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  remaining_uses │   │  invoice_prefix │   │  store_id       │       │
//! │  │  status         │   │  vat_rate (bps) │   │  user_id        │       │
//! │  │  unit base      │   │  timezone       │   │  shift_id       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  RedeemRequest  │   │  InvoiceResult  │   │ Invoice / Items │       │
//! │  │  ─────────────  │   │  ─────────────  │   │ Batch / Records │       │
//! │  │  cart lines     │──►│  series+number  │   │ (read side)     │       │
//! │  │  uses requested │   │  final / covered│   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Members, passes, plans and stores are integer-keyed (they are created by
//! other systems). Everything the ledger writes is UUID-keyed so ids can be
//! derived from idempotency keys before the row exists.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10% (Spanish reduced VAT on prepared drinks)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Pass
// =============================================================================

/// Lifecycle state of a member pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    /// Redeemable.
    Active,
    /// Frozen by staff; keeps its balance.
    Suspended,
    /// Past validity; soft-expired, never deleted.
    Expired,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Active => "active",
            PassStatus::Suspended => "suspended",
            PassStatus::Expired => "expired",
        }
    }
}

/// A member's finite-use prepaid credit, joined with its plan limits.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Pass {
    pub id: i64,
    pub member_id: i64,
    pub plan_id: i64,
    /// Uses left. Never negative.
    pub remaining_uses: i64,
    pub status: PassStatus,
    /// Monetary coverage of a single use.
    pub unit_allocated_base: Money,
    /// 0 means unlimited.
    pub max_uses_per_order: i64,
    /// 0 means unlimited.
    pub max_uses_per_day: i64,
    /// Informational. Redemption never reads it: expiry takes effect when
    /// the pass is moved to `PassStatus::Expired`.
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Pass {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == PassStatus::Active
    }
}

// =============================================================================
// Store & Operator
// =============================================================================

/// Per-store invoicing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub id: i64,
    pub name: String,
    /// Invoice prefix, e.g. "S1". Series become "S1Y25", "S1Y26", ...
    pub invoice_prefix: String,
    /// Issuer tax id (NIF) printed on invoices.
    pub tax_id: String,
    pub default_vat_rate: TaxRate,
    /// Compliance system the invoices are reported to (e.g. "VERIFACTU").
    pub billing_system: String,
    /// IANA timezone for local dates and the series year.
    pub timezone: String,
}

/// Authenticated cashier context supplied by the request layer.
///
/// Replaces ambient session state: every redemption names its store,
/// operator and open shift explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorContext {
    pub store_id: i64,
    pub user_id: i64,
    pub shift_id: i64,
}

// =============================================================================
// Redemption Request
// =============================================================================

/// One line of the cart being redeemed against.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    pub display_name: String,
    #[serde(default)]
    pub name_zh: Option<String>,
    #[serde(default)]
    pub name_es: Option<String>,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(default)]
    pub variant_name_zh: Option<String>,
    #[serde(default)]
    pub variant_name_es: Option<String>,
    pub quantity: i64,
    /// Final unit price, VAT included.
    pub unit_price_cents: i64,
    /// Free-form customizations (sugar, ice, toppings).
    #[serde(default)]
    #[ts(type = "unknown")]
    pub addons: serde_json::Value,
}

impl CartLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// A tender recorded alongside the redemption (for the payment summary).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub method: String,
    pub amount_cents: i64,
}

/// A redemption as received from the request layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub member_id: i64,
    pub pass_id: i64,
    pub uses_requested: i64,
    pub device_id: String,
    /// Store-local calendar date, `YYYY-MM-DD`.
    pub local_date: String,
    pub cart: Vec<CartLine>,
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
    /// Honored only when at least 32 characters long.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Invoice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Issued and immutable; corrections are separate invoices.
    Issued,
}

/// What a successful redemption returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResult {
    pub invoice_id: String,
    pub series: String,
    pub number: i64,
    /// Cash-payable amount (the extra over pass coverage).
    pub final_total: Money,
    /// Amount absorbed by the pass.
    pub covered: Money,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
}

/// Invoice header as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub store_id: i64,
    pub user_id: i64,
    pub shift_id: i64,
    pub issuer_tax_id: String,
    pub series: String,
    pub number: i64,
    pub issued_at: DateTime<Utc>,
    pub invoice_type: String,
    pub taxable_base: Money,
    pub vat_amount: Money,
    pub discount_amount: Money,
    pub final_total: Money,
    pub status: InvoiceStatus,
    pub compliance_system: String,
    pub payment_summary: serde_json::Value,
}

/// One invoice line; one per redeemed cart unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub line_no: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub item_name: String,
    pub variant_name: Option<String>,
    pub item_name_zh: Option<String>,
    pub item_name_es: Option<String>,
    pub variant_name_zh: Option<String>,
    pub variant_name_es: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub unit_taxable_base: Money,
    pub vat_rate: TaxRate,
    pub vat_amount: Money,
    pub customizations: serde_json::Value,
}

/// Groups the redemption records of one order against one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionBatch {
    pub id: String,
    pub pass_id: i64,
    pub invoice_id: String,
    pub redeemed_uses: i64,
    pub store_id: i64,
    pub cashier_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Coverage applied to one invoice line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub id: String,
    pub batch_id: String,
    pub pass_id: i64,
    pub invoice_id: String,
    pub invoice_item_id: String,
    pub invoice_series: String,
    pub invoice_number: i64,
    pub covered: Money,
    pub extra: Money,
    pub redeemed_at: DateTime<Utc>,
    pub store_id: i64,
    pub device_id: String,
    pub cashier_user_id: i64,
}

/// Uses consumed by a pass on one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub pass_id: i64,
    pub usage_date: NaiveDate,
    pub uses_count: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1000);
        assert_eq!(rate.bps(), 1000);
        assert!((rate.percentage() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_pass_status_strings() {
        assert_eq!(PassStatus::Active.as_str(), "active");
        assert_eq!(PassStatus::Suspended.as_str(), "suspended");
        let json = serde_json::to_string(&PassStatus::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }

    #[test]
    fn test_redeem_request_from_json() {
        let json = r#"{
            "memberId": 123,
            "passId": 456,
            "usesRequested": 1,
            "deviceId": "POS-01",
            "localDate": "2025-11-09",
            "cart": [
                { "productId": 1001, "displayName": "Classic milk tea", "quantity": 1, "unitPriceCents": 350 }
            ]
        }"#;
        let req: RedeemRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.pass_id, 456);
        assert_eq!(req.cart[0].unit_price().cents(), 350);
        assert!(req.cart[0].addons.is_null());
        assert!(req.payments.is_empty());
        assert!(req.idempotency_key.is_none());
    }

    #[test]
    fn test_invoice_result_serializes_camel_case() {
        let result = InvoiceResult {
            invoice_id: "id".to_string(),
            series: "S1Y25".to_string(),
            number: 1,
            final_total: Money::from_cents(250),
            covered: Money::from_cents(300),
            issued_at: Utc::now(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["finalTotal"], 250);
        assert_eq!(value["series"], "S1Y25");
    }
}
