//! # Redemption Repository
//!
//! Redemption batches (one per pass per invoice) and the per-line
//! redemption records under them.
//!
//! ```text
//! pass_redemption_batches  (pass 456, invoice A, redeemed_uses 2)
//!   ├── pass_redemptions   line 0  covered 3.00  extra 0.50
//!   ├── pass_redemptions   line 1  covered 2.00  extra 0.00
//!   └── pass_redemptions   line 2  covered 0.00  extra 2.00
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use passbook_core::clock::to_utc_window;
use passbook_core::{Money, RedemptionBatch, RedemptionRecord};

use crate::error::DbResult;
use crate::repository::ts;

// =============================================================================
// Rows
// =============================================================================

const RECORD_COLUMNS: &str = r#"
    id, batch_id, pass_id, invoice_id, invoice_item_id, invoice_series,
    invoice_number, covered_cents, extra_cents, redeemed_at, store_id,
    device_id, cashier_user_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    batch_id: String,
    pass_id: i64,
    invoice_id: String,
    invoice_item_id: String,
    invoice_series: String,
    invoice_number: i64,
    covered_cents: i64,
    extra_cents: i64,
    redeemed_at: DateTime<Utc>,
    store_id: i64,
    device_id: String,
    cashier_user_id: i64,
}

impl From<RecordRow> for RedemptionRecord {
    fn from(row: RecordRow) -> Self {
        RedemptionRecord {
            id: row.id,
            batch_id: row.batch_id,
            pass_id: row.pass_id,
            invoice_id: row.invoice_id,
            invoice_item_id: row.invoice_item_id,
            invoice_series: row.invoice_series,
            invoice_number: row.invoice_number,
            covered: Money::from_cents(row.covered_cents),
            extra: Money::from_cents(row.extra_cents),
            redeemed_at: row.redeemed_at,
            store_id: row.store_id,
            device_id: row.device_id,
            cashier_user_id: row.cashier_user_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: String,
    pass_id: i64,
    invoice_id: String,
    redeemed_uses: i64,
    store_id: i64,
    cashier_user_id: i64,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for RedemptionBatch {
    fn from(row: BatchRow) -> Self {
        RedemptionBatch {
            id: row.id,
            pass_id: row.pass_id,
            invoice_id: row.invoice_id,
            redeemed_uses: row.redeemed_uses,
            store_id: row.store_id,
            cashier_user_id: row.cashier_user_id,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for redemption batches and records.
#[derive(Debug, Clone)]
pub struct RedemptionRepository {
    pool: SqlitePool,
}

impl RedemptionRepository {
    /// Creates a new RedemptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RedemptionRepository { pool }
    }

    /// The batch a pass consumed on an invoice, if any.
    pub async fn batch_for_invoice(&self, invoice_id: &str) -> DbResult<Option<RedemptionBatch>> {
        let row: Option<BatchRow> = sqlx::query_as(
            r#"
            SELECT id, pass_id, invoice_id, redeemed_uses, store_id, cashier_user_id, created_at
            FROM pass_redemption_batches
            WHERE invoice_id = ?1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RedemptionBatch::from))
    }

    /// Records of an invoice, in line order.
    pub async fn records_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<RedemptionRecord>> {
        let sql = format!(
            "SELECT {} FROM pass_redemptions WHERE invoice_id = ?1 ORDER BY rowid",
            RECORD_COLUMNS
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(RedemptionRecord::from).collect())
    }

    /// Records of a pass redeemed in `[start, end)`.
    pub async fn records_for_pass_between(
        &self,
        pass_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<RedemptionRecord>> {
        let sql = format!(
            "SELECT {} FROM pass_redemptions \
             WHERE pass_id = ?1 AND redeemed_at >= ?2 AND redeemed_at < ?3 \
             ORDER BY redeemed_at, rowid",
            RECORD_COLUMNS
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(pass_id)
            .bind(ts(start))
            .bind(ts(end))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(RedemptionRecord::from).collect())
    }

    /// Records of a pass on one local calendar day in `tz`.
    pub async fn records_for_pass_on(
        &self,
        pass_id: i64,
        date: NaiveDate,
        tz: Tz,
    ) -> DbResult<Vec<RedemptionRecord>> {
        let (start, end) = to_utc_window(date, tz);
        self.records_for_pass_between(pass_id, start, end).await
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Inserts a redemption batch.
    pub async fn insert_batch(conn: &mut SqliteConnection, batch: &RedemptionBatch) -> DbResult<()> {
        debug!(
            id = %batch.id,
            pass_id = batch.pass_id,
            invoice_id = %batch.invoice_id,
            redeemed_uses = batch.redeemed_uses,
            "Inserting redemption batch"
        );

        sqlx::query(
            r#"
            INSERT INTO pass_redemption_batches (
                id, pass_id, invoice_id, redeemed_uses, store_id, cashier_user_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&batch.id)
        .bind(batch.pass_id)
        .bind(&batch.invoice_id)
        .bind(batch.redeemed_uses)
        .bind(batch.store_id)
        .bind(batch.cashier_user_id)
        .bind(ts(batch.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts one redemption record.
    pub async fn insert_record(conn: &mut SqliteConnection, record: &RedemptionRecord) -> DbResult<()> {
        debug!(
            batch_id = %record.batch_id,
            invoice_item_id = %record.invoice_item_id,
            covered = %record.covered,
            extra = %record.extra,
            "Inserting redemption record"
        );

        sqlx::query(
            r#"
            INSERT INTO pass_redemptions (
                id, batch_id, pass_id, invoice_id, invoice_item_id,
                invoice_series, invoice_number, covered_cents, extra_cents,
                redeemed_at, store_id, device_id, cashier_user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&record.id)
        .bind(&record.batch_id)
        .bind(record.pass_id)
        .bind(&record.invoice_id)
        .bind(&record.invoice_item_id)
        .bind(&record.invoice_series)
        .bind(record.invoice_number)
        .bind(record.covered.cents())
        .bind(record.extra.cents())
        .bind(ts(record.redeemed_at))
        .bind(record.store_id)
        .bind(&record.device_id)
        .bind(record.cashier_user_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
