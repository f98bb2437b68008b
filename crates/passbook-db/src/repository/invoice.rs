//! # Invoice Repository
//!
//! Invoice headers and their line items.
//!
//! ## Invoice Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  invoices  (id = UUID, doubles as the idempotency target)              │
//! │  ├── series + number         UNIQUE                                     │
//! │  ├── taxable_base / vat / discount (pass covered) / final_total        │
//! │  └── payment_summary         {"pass_covered", "total", "by_method"}    │
//! │        │                                                                │
//! │        └── invoice_items     one row per redeemed unit, line_no 0..n   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Issued invoices are immutable; corrections are separate invoices that
//! reference the original.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use passbook_core::{Invoice, InvoiceItem, InvoiceResult, InvoiceStatus, Money, TaxRate};

use crate::error::{DbError, DbResult};
use crate::repository::{blob, parse_blob, ts};

// =============================================================================
// Rows
// =============================================================================

const INVOICE_SELECT: &str = r#"
    SELECT id, store_id, user_id, shift_id, issuer_tax_id, series, number,
           issued_at, invoice_type, taxable_base_cents, vat_amount_cents,
           discount_amount_cents, final_total_cents, status, compliance_system,
           payment_summary
    FROM invoices
    WHERE id = ?1
"#;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    store_id: i64,
    user_id: i64,
    shift_id: i64,
    issuer_tax_id: String,
    series: String,
    number: i64,
    issued_at: DateTime<Utc>,
    invoice_type: String,
    taxable_base_cents: i64,
    vat_amount_cents: i64,
    discount_amount_cents: i64,
    final_total_cents: i64,
    status: InvoiceStatus,
    compliance_system: String,
    payment_summary: String,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> DbResult<Self> {
        Ok(Invoice {
            payment_summary: parse_blob("payment_summary", &row.payment_summary)?,
            id: row.id,
            store_id: row.store_id,
            user_id: row.user_id,
            shift_id: row.shift_id,
            issuer_tax_id: row.issuer_tax_id,
            series: row.series,
            number: row.number,
            issued_at: row.issued_at,
            invoice_type: row.invoice_type,
            taxable_base: Money::from_cents(row.taxable_base_cents),
            vat_amount: Money::from_cents(row.vat_amount_cents),
            discount_amount: Money::from_cents(row.discount_amount_cents),
            final_total: Money::from_cents(row.final_total_cents),
            status: row.status,
            compliance_system: row.compliance_system,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceItemRow {
    id: String,
    invoice_id: String,
    line_no: i64,
    product_id: i64,
    variant_id: Option<i64>,
    item_name: String,
    variant_name: Option<String>,
    item_name_zh: Option<String>,
    item_name_es: Option<String>,
    variant_name_zh: Option<String>,
    variant_name_es: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    unit_taxable_base_cents: i64,
    vat_rate_bps: i64,
    vat_amount_cents: i64,
    customizations: String,
}

impl TryFrom<InvoiceItemRow> for InvoiceItem {
    type Error = DbError;

    fn try_from(row: InvoiceItemRow) -> DbResult<Self> {
        Ok(InvoiceItem {
            customizations: parse_blob("customizations", &row.customizations)?,
            id: row.id,
            invoice_id: row.invoice_id,
            line_no: row.line_no,
            product_id: row.product_id,
            variant_id: row.variant_id,
            item_name: row.item_name,
            variant_name: row.variant_name,
            item_name_zh: row.item_name_zh,
            item_name_es: row.item_name_es,
            variant_name_zh: row.variant_name_zh,
            variant_name_es: row.variant_name_es,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            unit_taxable_base: Money::from_cents(row.unit_taxable_base_cents),
            vat_rate: TaxRate::from_bps(row.vat_rate_bps.clamp(0, 10_000) as u32),
            vat_amount: Money::from_cents(row.vat_amount_cents),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    id: String,
    series: String,
    number: i64,
    final_total_cents: i64,
    discount_amount_cents: i64,
    issued_at: DateTime<Utc>,
}

impl From<ResultRow> for InvoiceResult {
    fn from(row: ResultRow) -> Self {
        InvoiceResult {
            invoice_id: row.id,
            series: row.series,
            number: row.number,
            final_total: Money::from_cents(row.final_total_cents),
            covered: Money::from_cents(row.discount_amount_cents),
            issued_at: row.issued_at,
        }
    }
}

/// An invoice counts as a replay target only for the pass it redeemed.
const RESULT_FOR_PASS_SELECT: &str = r#"
    SELECT i.id, i.series, i.number, i.final_total_cents, i.discount_amount_cents, i.issued_at
    FROM invoices i
    JOIN pass_redemption_batches b ON b.invoice_id = i.id
    WHERE i.id = ?1 AND b.pass_id = ?2
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoices and invoice items.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice header by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let row: Option<InvoiceRow> = sqlx::query_as(INVOICE_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Invoice::try_from).transpose()
    }

    /// Gets an invoice together with its lines in `line_no` order.
    pub async fn get_with_items(&self, id: &str) -> DbResult<Option<(Invoice, Vec<InvoiceItem>)>> {
        let Some(invoice) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let items = self.get_items(id).await?;
        Ok(Some((invoice, items)))
    }

    /// Gets all lines of an invoice in `line_no` order.
    pub async fn get_items(&self, invoice_id: &str) -> DbResult<Vec<InvoiceItem>> {
        let rows: Vec<InvoiceItemRow> = sqlx::query_as(
            r#"
            SELECT id, invoice_id, line_no, product_id, variant_id, item_name,
                   variant_name, item_name_zh, item_name_es, variant_name_zh,
                   variant_name_es, quantity, unit_price_cents,
                   unit_taxable_base_cents, vat_rate_bps, vat_amount_cents,
                   customizations
            FROM invoice_items
            WHERE invoice_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InvoiceItem::try_from).collect()
    }

    /// The redemption result an invoice represents, if it redeemed `pass_id`
    /// (for idempotent replays).
    pub async fn find_result_for_pass(&self, id: &str, pass_id: i64) -> DbResult<Option<InvoiceResult>> {
        let row: Option<ResultRow> = sqlx::query_as(RESULT_FOR_PASS_SELECT)
            .bind(id)
            .bind(pass_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(InvoiceResult::from))
    }

    /// Numbers issued in a series, ascending.
    pub async fn numbers_in_series(&self, series: &str) -> DbResult<Vec<i64>> {
        let numbers: Vec<i64> =
            sqlx::query_scalar("SELECT number FROM invoices WHERE series = ?1 ORDER BY number")
                .bind(series)
                .fetch_all(&self.pool)
                .await?;

        Ok(numbers)
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Same as [`find_result_for_pass`](Self::find_result_for_pass), inside the
    /// caller's transaction.
    pub async fn find_result_for_pass_in(
        conn: &mut SqliteConnection,
        id: &str,
        pass_id: i64,
    ) -> DbResult<Option<InvoiceResult>> {
        let row: Option<ResultRow> = sqlx::query_as(RESULT_FOR_PASS_SELECT)
            .bind(id)
            .bind(pass_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(InvoiceResult::from))
    }

    /// Whether an invoice with this ID exists at all.
    pub async fn exists_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM invoices WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(found.is_some())
    }

    /// Inserts an invoice header.
    pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(
            id = %invoice.id,
            series = %invoice.series,
            number = invoice.number,
            final_total = %invoice.final_total,
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, store_id, user_id, shift_id, issuer_tax_id,
                series, number, issued_at, invoice_type,
                taxable_base_cents, vat_amount_cents, discount_amount_cents, final_total_cents,
                status, compliance_system, compliance_data, payment_summary,
                references_invoice_id, correction_type
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, '{}', ?16,
                NULL, NULL
            )
            "#,
        )
        .bind(&invoice.id)
        .bind(invoice.store_id)
        .bind(invoice.user_id)
        .bind(invoice.shift_id)
        .bind(&invoice.issuer_tax_id)
        .bind(&invoice.series)
        .bind(invoice.number)
        .bind(ts(invoice.issued_at))
        .bind(&invoice.invoice_type)
        .bind(invoice.taxable_base.cents())
        .bind(invoice.vat_amount.cents())
        .bind(invoice.discount_amount.cents())
        .bind(invoice.final_total.cents())
        .bind(invoice.status)
        .bind(&invoice.compliance_system)
        .bind(blob(&invoice.payment_summary))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts one invoice line.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &InvoiceItem) -> DbResult<()> {
        debug!(
            invoice_id = %item.invoice_id,
            line_no = item.line_no,
            product_id = item.product_id,
            "Inserting invoice item"
        );

        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                id, invoice_id, line_no, product_id, variant_id,
                item_name, variant_name, item_name_zh, item_name_es,
                variant_name_zh, variant_name_es,
                quantity, unit_price_cents, unit_taxable_base_cents,
                vat_rate_bps, vat_amount_cents, customizations
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17
            )
            "#,
        )
        .bind(&item.id)
        .bind(&item.invoice_id)
        .bind(item.line_no)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(&item.item_name)
        .bind(&item.variant_name)
        .bind(&item.item_name_zh)
        .bind(&item.item_name_es)
        .bind(&item.variant_name_zh)
        .bind(&item.variant_name_es)
        .bind(item.quantity)
        .bind(item.unit_price.cents())
        .bind(item.unit_taxable_base.cents())
        .bind(item.vat_rate.bps() as i64)
        .bind(item.vat_amount.cents())
        .bind(blob(&item.customizations))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Line item IDs of an invoice in insertion (`line_no`) order.
    pub async fn item_ids(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM invoice_items WHERE invoice_id = ?1 ORDER BY line_no")
                .bind(invoice_id)
                .fetch_all(&mut *conn)
                .await?;

        Ok(ids)
    }
}
