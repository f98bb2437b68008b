//! # Pass Repository
//!
//! Member passes, their plans, the pass lock and the daily usage counter.
//!
//! ## Locking a Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │  UPDATE member_passes SET updated_at = updated_at WHERE id = ?  ◄ lock  │
//! │      │                                                                  │
//! │      ├── another writer active? busy handler waits (≤ busy_timeout)    │
//! │      └── 0 rows? pass does not exist                                    │
//! │  SELECT … FROM member_passes JOIN pass_plans                    ◄ read  │
//! │  … gate, ledger writes …                                                │
//! │  UPDATE member_passes SET remaining_uses = remaining_uses - n   ◄ deduct│
//! │  COMMIT                                                         ◄ free  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! SQLite has no `SELECT … FOR UPDATE`. Making the first statement of the
//! transaction a write takes the database writer lock, which is held until
//! commit or rollback, so the check-then-deduct window is closed.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::ts;
use passbook_core::{DailyUsage, Money, Pass, PassStatus};

// =============================================================================
// Rows
// =============================================================================

const PASS_COLUMNS: &str = r#"
    p.id,
    p.member_id,
    p.plan_id,
    p.remaining_uses,
    p.status,
    p.unit_allocated_base_cents,
    COALESCE(pl.max_uses_per_order, 1) AS max_uses_per_order,
    pl.max_uses_per_day,
    p.expires_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct PassRow {
    id: i64,
    member_id: i64,
    plan_id: i64,
    remaining_uses: i64,
    status: PassStatus,
    unit_allocated_base_cents: i64,
    max_uses_per_order: i64,
    max_uses_per_day: i64,
    expires_at: Option<DateTime<Utc>>,
}

impl From<PassRow> for Pass {
    fn from(row: PassRow) -> Self {
        Pass {
            id: row.id,
            member_id: row.member_id,
            plan_id: row.plan_id,
            remaining_uses: row.remaining_uses,
            status: row.status,
            unit_allocated_base: Money::from_cents(row.unit_allocated_base_cents),
            max_uses_per_order: row.max_uses_per_order,
            max_uses_per_day: row.max_uses_per_day,
            expires_at: row.expires_at,
        }
    }
}

/// A plan to create (seeding, tests).
#[derive(Debug, Clone)]
pub struct NewPassPlan {
    pub name: String,
    pub total_uses: i64,
    pub validity_days: i64,
    /// `None` falls back to one use per order.
    pub max_uses_per_order: Option<i64>,
    /// 0 means unlimited.
    pub max_uses_per_day: i64,
}

/// A member pass to create (seeding, tests).
#[derive(Debug, Clone)]
pub struct NewMemberPass {
    pub member_id: i64,
    pub plan_id: i64,
    pub remaining_uses: i64,
    pub unit_allocated_base: Money,
    pub status: PassStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for passes, plans and daily usage.
#[derive(Debug, Clone)]
pub struct PassRepository {
    pool: SqlitePool,
}

impl PassRepository {
    /// Creates a new PassRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PassRepository { pool }
    }

    /// Gets a pass (joined with its plan) by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Pass>> {
        let sql = format!(
            "SELECT {} FROM member_passes p JOIN pass_plans pl ON pl.id = p.plan_id WHERE p.id = ?1",
            PASS_COLUMNS
        );
        let row: Option<PassRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Pass::from))
    }

    /// Inserts a plan and returns its ID.
    pub async fn create_plan(&self, plan: &NewPassPlan) -> DbResult<i64> {
        debug!(name = %plan.name, total_uses = plan.total_uses, "Creating pass plan");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pass_plans (
                name, total_uses, validity_days, max_uses_per_order, max_uses_per_day
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(&plan.name)
        .bind(plan.total_uses)
        .bind(plan.validity_days)
        .bind(plan.max_uses_per_order)
        .bind(plan.max_uses_per_day)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Inserts a member pass and returns its ID.
    pub async fn create_pass(&self, pass: &NewMemberPass) -> DbResult<i64> {
        debug!(
            member_id = pass.member_id,
            plan_id = pass.plan_id,
            remaining_uses = pass.remaining_uses,
            "Creating member pass"
        );

        let now = ts(Utc::now());
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO member_passes (
                member_id, plan_id, remaining_uses, status,
                unit_allocated_base_cents, expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING id
            "#,
        )
        .bind(pass.member_id)
        .bind(pass.plan_id)
        .bind(pass.remaining_uses)
        .bind(pass.status)
        .bind(pass.unit_allocated_base.cents())
        .bind(pass.expires_at.map(ts))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Changes a pass's lifecycle state (staff suspend / expiry sweep).
    pub async fn set_status(&self, id: i64, status: PassStatus) -> DbResult<()> {
        debug!(pass_id = id, status = status.as_str(), "Updating pass status");

        let result = sqlx::query(
            "UPDATE member_passes SET status = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(status)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Pass", id));
        }

        Ok(())
    }

    /// Uses recorded for a pass on a local date.
    pub async fn daily_usage(&self, pass_id: i64, date: NaiveDate) -> DbResult<Option<DailyUsage>> {
        let row: Option<(i64, NaiveDate, i64)> = sqlx::query_as(
            "SELECT pass_id, usage_date, uses_count FROM pass_daily_usage WHERE pass_id = ?1 AND usage_date = ?2",
        )
        .bind(pass_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(pass_id, usage_date, uses_count)| DailyUsage {
            pass_id,
            usage_date,
            uses_count,
        }))
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Takes the writer lock on a pass and reads it.
    ///
    /// Must be the first statement of the transaction. Returns `None` when
    /// the pass does not exist.
    pub async fn lock_for_update(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Pass>> {
        let result = sqlx::query("UPDATE member_passes SET updated_at = updated_at WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM member_passes p JOIN pass_plans pl ON pl.id = p.plan_id WHERE p.id = ?1",
            PASS_COLUMNS
        );
        let row: Option<PassRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(Pass::from))
    }

    /// Uses already consumed on a local date (0 when no row exists).
    pub async fn used_on(conn: &mut SqliteConnection, pass_id: i64, date: NaiveDate) -> DbResult<i64> {
        let used: Option<i64> = sqlx::query_scalar(
            "SELECT uses_count FROM pass_daily_usage WHERE pass_id = ?1 AND usage_date = ?2",
        )
        .bind(pass_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(used.unwrap_or(0))
    }

    /// Adds uses to the daily counter, creating the row if absent.
    pub async fn add_daily_usage(
        conn: &mut SqliteConnection,
        pass_id: i64,
        date: NaiveDate,
        uses: i64,
    ) -> DbResult<i64> {
        debug!(pass_id, date = %date, uses, "Upserting daily usage");

        let total: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pass_daily_usage (pass_id, usage_date, uses_count)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (pass_id, usage_date)
            DO UPDATE SET uses_count = uses_count + excluded.uses_count
            RETURNING uses_count
            "#,
        )
        .bind(pass_id)
        .bind(date)
        .bind(uses)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Deducts uses from a pass and returns the new balance.
    ///
    /// The guard `remaining_uses >= uses` makes an overdraft impossible even
    /// if a caller skipped the gate; a miss is an invariant violation.
    pub async fn decrement_uses(
        conn: &mut SqliteConnection,
        pass_id: i64,
        uses: i64,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        debug!(pass_id, uses, "Decrementing pass balance");

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE member_passes
            SET remaining_uses = remaining_uses - ?2,
                updated_at = ?3
            WHERE id = ?1 AND remaining_uses >= ?2
            RETURNING remaining_uses
            "#,
        )
        .bind(pass_id)
        .bind(uses)
        .bind(ts(now))
        .fetch_optional(&mut *conn)
        .await?;

        remaining.ok_or_else(|| {
            DbError::Invariant(format!(
                "pass {} cannot cover {} uses at deduction time",
                pass_id, uses
            ))
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
