//! # Ledger Writer
//!
//! Persists one redemption: invoice, lines, batch, records, daily usage
//! and the balance deduction, inside the caller's transaction.
//!
//! ## Write Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller: BEGIN + pass lock + gate + allocation                         │
//! │                                                                         │
//! │  LedgerWriter::commit(&mut tx, &entry)                                 │
//! │   1. series (prefix + "Y" + yy) ─► next number in series                │
//! │   2. header totals from the allocation                                 │
//! │   3. INSERT invoices                                                   │
//! │   4. INSERT invoice_items          one per expanded unit               │
//! │   5. INSERT pass_redemption_batches                                    │
//! │   6. SELECT item ids by line_no ─► INSERT pass_redemptions per unit    │
//! │   7. UPSERT pass_daily_usage                                           │
//! │   8. UPDATE member_passes remaining_uses - n   (guarded)               │
//! │                                                                         │
//! │  caller: COMMIT  (or drop ─► ROLLBACK, number released)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in here commits. Any `Err` leaves the transaction to be rolled
//! back by its owner.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use passbook_core::allocation::Allocation;
use passbook_core::clock::two_digit_year;
use passbook_core::invoice::{
    effective_prefix, line_for_unit, series_for, unit_tax, InvoiceTotals, PaymentSummary,
    INVOICE_TYPE_SIMPLIFIED,
};
use passbook_core::{
    CartLine, Invoice, InvoiceItem, InvoiceResult, InvoiceStatus, OperatorContext, Pass,
    PaymentInput, RedemptionBatch, RedemptionRecord, StoreConfig,
};

use crate::error::{DbError, DbResult};
use crate::repository::invoice::InvoiceRepository;
use crate::repository::pass::PassRepository;
use crate::repository::redemption::RedemptionRepository;
use crate::repository::sequence::SequenceRepository;

/// Everything the writer needs, already validated and allocated.
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub invoice_id: Uuid,
    pub store: &'a StoreConfig,
    /// Timezone of `store`, resolved by the caller.
    pub timezone: Tz,
    pub operator: OperatorContext,
    pub pass: &'a Pass,
    pub uses: i64,
    pub cart: &'a [CartLine],
    pub allocation: &'a Allocation,
    pub payments: &'a [PaymentInput],
    pub device_id: &'a str,
    pub local_date: NaiveDate,
    pub issued_at: DateTime<Utc>,
}

/// Writes ledger entries.
pub struct LedgerWriter;

impl LedgerWriter {
    /// Writes `entry` into the open transaction on `conn`.
    pub async fn commit(conn: &mut SqliteConnection, entry: &LedgerEntry<'_>) -> DbResult<InvoiceResult> {
        let store = entry.store;
        let rate = store.default_vat_rate;
        let invoice_id = entry.invoice_id.to_string();

        // Series year follows the store's calendar, not UTC
        let prefix = effective_prefix(&store.invoice_prefix);
        let series = series_for(prefix, two_digit_year(entry.issued_at, entry.timezone));
        let number =
            SequenceRepository::next_in(conn, prefix, &series, &store.billing_system).await?;

        let totals = InvoiceTotals::from_allocation(entry.allocation, rate);
        let summary = PaymentSummary::build(entry.payments, totals.discount_amount);

        let invoice = Invoice {
            id: invoice_id.clone(),
            store_id: store.id,
            user_id: entry.operator.user_id,
            shift_id: entry.operator.shift_id,
            issuer_tax_id: store.tax_id.clone(),
            series: series.clone(),
            number,
            issued_at: entry.issued_at,
            invoice_type: INVOICE_TYPE_SIMPLIFIED.to_string(),
            taxable_base: totals.taxable_base,
            vat_amount: totals.vat_amount,
            discount_amount: totals.discount_amount,
            final_total: totals.final_total,
            status: InvoiceStatus::Issued,
            compliance_system: store.billing_system.clone(),
            payment_summary: summary.to_json(),
        };
        InvoiceRepository::insert(conn, &invoice).await?;

        for unit in &entry.allocation.per_unit {
            let line = entry.cart.get(unit.line_index).ok_or_else(|| {
                DbError::Invariant(format!(
                    "unit {} points at missing cart line {}",
                    unit.unit_index, unit.line_index
                ))
            })?;
            let (unit_base, unit_vat) = unit_tax(unit.unit_price, rate);

            let item = InvoiceItem {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice_id.clone(),
                line_no: unit.unit_index as i64,
                product_id: line.product_id,
                variant_id: line.variant_id,
                item_name: line.display_name.clone(),
                variant_name: line.variant_name.clone(),
                item_name_zh: line.name_zh.clone(),
                item_name_es: line.name_es.clone(),
                variant_name_zh: line.variant_name_zh.clone(),
                variant_name_es: line.variant_name_es.clone(),
                quantity: 1,
                unit_price: unit.unit_price,
                unit_taxable_base: unit_base,
                vat_rate: rate,
                vat_amount: unit_vat,
                customizations: line.addons.clone(),
            };
            InvoiceRepository::insert_item(conn, &item).await?;
        }

        let batch = RedemptionBatch {
            id: Uuid::new_v4().to_string(),
            pass_id: entry.pass.id,
            invoice_id: invoice_id.clone(),
            redeemed_uses: entry.uses,
            store_id: store.id,
            cashier_user_id: entry.operator.user_id,
            created_at: entry.issued_at,
        };
        RedemptionRepository::insert_batch(conn, &batch).await?;

        let item_ids = InvoiceRepository::item_ids(conn, &invoice_id).await?;
        for unit in &entry.allocation.per_unit {
            let Some(slot) = line_for_unit(unit.unit_index, item_ids.len()) else {
                return Err(DbError::Invariant(format!(
                    "invoice {} has no lines to attach redemptions to",
                    invoice_id
                )));
            };

            let record = RedemptionRecord {
                id: Uuid::new_v4().to_string(),
                batch_id: batch.id.clone(),
                pass_id: entry.pass.id,
                invoice_id: invoice_id.clone(),
                invoice_item_id: item_ids[slot].clone(),
                invoice_series: series.clone(),
                invoice_number: number,
                covered: unit.covered,
                extra: unit.extra,
                redeemed_at: entry.issued_at,
                store_id: store.id,
                device_id: entry.device_id.to_string(),
                cashier_user_id: entry.operator.user_id,
            };
            RedemptionRepository::insert_record(conn, &record).await?;
        }

        PassRepository::add_daily_usage(conn, entry.pass.id, entry.local_date, entry.uses).await?;
        let remaining =
            PassRepository::decrement_uses(conn, entry.pass.id, entry.uses, entry.issued_at).await?;

        debug!(
            invoice_id = %invoice_id,
            series = %series,
            number,
            remaining,
            "Ledger entry written"
        );

        Ok(InvoiceResult {
            invoice_id,
            series,
            number,
            final_total: totals.final_total,
            covered: totals.discount_amount,
            issued_at: entry.issued_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use passbook_core::allocation::{allocate, expand_units};
    use passbook_core::{Money, PassStatus, TaxRate};

    use crate::pool::{Database, DbConfig};
    use crate::repository::pass::{NewMemberPass, NewPassPlan};

    fn store() -> StoreConfig {
        StoreConfig {
            id: 1,
            name: "Centro".to_string(),
            invoice_prefix: "S1".to_string(),
            tax_id: "B12345678".to_string(),
            default_vat_rate: TaxRate::from_bps(1000),
            billing_system: "VERIFACTU".to_string(),
            timezone: "Europe/Madrid".to_string(),
        }
    }

    fn line(product_id: i64, price: i64, qty: i64) -> CartLine {
        CartLine {
            product_id,
            variant_id: None,
            display_name: format!("Drink {}", product_id),
            name_zh: None,
            name_es: None,
            variant_name: None,
            variant_name_zh: None,
            variant_name_es: None,
            quantity: qty,
            unit_price_cents: price,
            addons: serde_json::json!({"ice": "less"}),
        }
    }

    async fn setup() -> (Database, Pass) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores().insert(&store()).await.unwrap();
        let plan_id = db
            .passes()
            .create_plan(&NewPassPlan {
                name: "10 drinks".to_string(),
                total_uses: 10,
                validity_days: 90,
                max_uses_per_order: Some(0),
                max_uses_per_day: 0,
            })
            .await
            .unwrap();
        let pass_id = db
            .passes()
            .create_pass(&NewMemberPass {
                member_id: 123,
                plan_id,
                remaining_uses: 5,
                unit_allocated_base: Money::from_cents(300),
                status: PassStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();
        let pass = db.passes().get_by_id(pass_id).await.unwrap().unwrap();
        (db, pass)
    }

    #[tokio::test]
    async fn test_writes_every_row() {
        let (db, pass) = setup().await;
        let store = store();
        let cart = vec![line(1, 350, 2), line(2, 200, 1)];
        let allocation = allocate(&expand_units(&cart), pass.unit_allocated_base, 2);
        let issued_at = Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 0).unwrap();
        let entry = LedgerEntry {
            invoice_id: Uuid::new_v4(),
            store: &store,
            timezone: chrono_tz::Europe::Madrid,
            operator: OperatorContext {
                store_id: 1,
                user_id: 7,
                shift_id: 3,
            },
            pass: &pass,
            uses: 2,
            cart: &cart,
            allocation: &allocation,
            payments: &[PaymentInput {
                method: "cash".to_string(),
                amount_cents: 300,
            }],
            device_id: "POS-01",
            local_date: NaiveDate::from_ymd_opt(2025, 11, 9).unwrap(),
            issued_at,
        };

        let mut tx = db.pool().begin().await.unwrap();
        let result = LedgerWriter::commit(&mut tx, &entry).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(result.series, "S1Y25");
        assert_eq!(result.number, 1);
        // 3.50 + 3.50 covered 3.00 each, 2.00 cash
        assert_eq!(result.covered.cents(), 600);
        assert_eq!(result.final_total.cents(), 300);
        assert_eq!(result.issued_at, issued_at);

        let (invoice, items) = db
            .invoices()
            .get_with_items(&result.invoice_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.taxable_base.cents(), 273);
        assert_eq!(invoice.vat_amount.cents(), 27);
        assert_eq!(invoice.discount_amount.cents(), 600);
        assert_eq!(invoice.payment_summary["pass_covered"], 600);
        assert_eq!(invoice.payment_summary["by_method"]["cash"], 300);
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.quantity == 1));
        assert_eq!(items[2].product_id, 2);
        assert_eq!(items[0].customizations["ice"], "less");

        let records = db.redemptions().records_for_invoice(&result.invoice_id).await.unwrap();
        assert_eq!(records.len(), 3);
        let covered: Money = records.iter().map(|r| r.covered).sum();
        assert_eq!(covered, result.covered);
        assert_eq!(records[2].invoice_item_id, items[2].id);

        let batch = db
            .redemptions()
            .batch_for_invoice(&result.invoice_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.redeemed_uses, 2);

        let usage = db
            .passes()
            .daily_usage(pass.id, entry.local_date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.uses_count, 2);
        let after = db.passes().get_by_id(pass.id).await.unwrap().unwrap();
        assert_eq!(after.remaining_uses, 3);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let (db, pass) = setup().await;
        let store = store();
        let cart = vec![line(1, 350, 1)];
        let allocation = allocate(&expand_units(&cart), pass.unit_allocated_base, 1);
        let entry = LedgerEntry {
            invoice_id: Uuid::new_v4(),
            store: &store,
            timezone: chrono_tz::Europe::Madrid,
            operator: OperatorContext {
                store_id: 1,
                user_id: 7,
                shift_id: 3,
            },
            pass: &pass,
            // More than the balance: the guarded deduction fails last
            uses: 6,
            cart: &cart,
            allocation: &allocation,
            payments: &[],
            device_id: "POS-01",
            local_date: NaiveDate::from_ymd_opt(2025, 11, 9).unwrap(),
            issued_at: Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 0).unwrap(),
        };

        let mut tx = db.pool().begin().await.unwrap();
        let err = LedgerWriter::commit(&mut tx, &entry).await.unwrap_err();
        assert!(matches!(err, DbError::Invariant(_)));
        drop(tx);

        assert!(db.invoices().get_by_id(&entry.invoice_id.to_string()).await.unwrap().is_none());
        assert_eq!(db.sequences().current("S1", "S1Y25").await.unwrap(), None);
        let after = db.passes().get_by_id(pass.id).await.unwrap().unwrap();
        assert_eq!(after.remaining_uses, 5);
    }
}
