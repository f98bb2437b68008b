//! # Invoice Sequence Repository
//!
//! Gap-free invoice numbers per (prefix, series).
//!
//! ## Allocation Inside the Ledger Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── INSERT counter (prefix, series, 0) ON CONFLICT DO NOTHING         │
//! │   ├── UPDATE current_number = current_number + 1 RETURNING  ──► n      │
//! │   ├── INSERT invoice (series, n) …                                      │
//! │   └── … any failure ──► ROLLBACK: counter back to n - 1                 │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  S1Y25: 1, 2, 3, 4 …   no number is ever skipped or issued twice        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The counter row is created on first use; the primary key on
//! `(invoice_prefix, series)` settles a first-use race between writers.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Repository for invoice number sequences.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Allocates the next number in its own transaction.
    ///
    /// For administrative callers only. The ledger allocates through
    /// [`SequenceRepository::next_in`] so a failed write releases the number.
    pub async fn allocate(&self, prefix: &str, series: &str, compliance_system: &str) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let number = Self::next_in(&mut tx, prefix, series, compliance_system).await?;
        tx.commit().await?;
        Ok(number)
    }

    /// Last number issued in a series, if the series exists.
    pub async fn current(&self, prefix: &str, series: &str) -> DbResult<Option<i64>> {
        let current: Option<i64> = sqlx::query_scalar(
            "SELECT current_number FROM invoice_sequences WHERE invoice_prefix = ?1 AND series = ?2",
        )
        .bind(prefix)
        .bind(series)
        .fetch_optional(&self.pool)
        .await?;

        Ok(current)
    }

    /// Allocates the next number inside the caller's transaction.
    ///
    /// The first number of a new series is 1.
    pub async fn next_in(
        conn: &mut SqliteConnection,
        prefix: &str,
        series: &str,
        compliance_system: &str,
    ) -> DbResult<i64> {
        sqlx::query(
            r#"
            INSERT INTO invoice_sequences (invoice_prefix, series, compliance_system, current_number)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT (invoice_prefix, series) DO NOTHING
            "#,
        )
        .bind(prefix)
        .bind(series)
        .bind(compliance_system)
        .execute(&mut *conn)
        .await?;

        let number: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE invoice_sequences
            SET current_number = current_number + 1
            WHERE invoice_prefix = ?1 AND series = ?2
            RETURNING current_number
            "#,
        )
        .bind(prefix)
        .bind(series)
        .fetch_optional(&mut *conn)
        .await?;

        let number = number.ok_or_else(|| {
            DbError::Invariant(format!("invoice sequence {}/{} vanished", prefix, series))
        })?;

        debug!(prefix, series, number, "Allocated invoice number");
        Ok(number)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
