//! # Redemption Orchestrator
//!
//! The entry point: one call, one transaction, one invoice (or none).
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  redeem(operator, request)                                              │
//! │   │                                                                     │
//! │   ├── validate operator + request ─────────────► Invalid (no tx opened) │
//! │   ├── BEGIN                                                             │
//! │   ├── lock pass ───────────────────────────────► PassNotFound           │
//! │   ├── member owns pass? ───────────────────────► MemberMismatch         │
//! │   ├── keyed, invoice exists for this pass? ────► prior result (replay)  │
//! │   ├── keyed, invoice exists for another pass? ─► Conflict               │
//! │   ├── load store ──────────────────────────────► StoreNotFound          │
//! │   ├── daily usage (only if the plan limits it)                          │
//! │   ├── gate ────────────────────────────────────► Rejected               │
//! │   ├── expand + allocate                                                 │
//! │   ├── LedgerWriter::commit ────────────────────► Db (rolled back)       │
//! │   └── COMMIT ──────────────────────────────────► InvoiceResult          │
//! │                                                                         │
//! │  UniqueViolation on a keyed request ─► re-read the invoice ─► replay    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Tasks share nothing in-process. The pass lock is SQLite's writer lock,
//! taken by the first statement of the transaction, so two redemptions of
//! the same pass (or two numbers from the same series) never interleave.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use passbook_core::allocation::{allocate, expand_units};
use passbook_core::clock::{parse_timezone, Clock, SystemClock, DEFAULT_TIMEZONE};
use passbook_core::gate::check_redemption;
use passbook_core::invoice::{honored_key, resolve_invoice_id};
use passbook_core::validation::{validate_operator, validate_redeem_request};
use passbook_core::{InvoiceResult, OperatorContext, Rejection, RedeemRequest, StoreConfig};

use crate::error::DbError;
use crate::failure::RedeemError;
use crate::ledger::{LedgerEntry, LedgerWriter};
use crate::repository::invoice::InvoiceRepository;
use crate::repository::pass::PassRepository;
use crate::repository::store::StoreRepository;

/// Redeems pass uses against carts.
#[derive(Clone)]
pub struct RedemptionService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    default_timezone: Tz,
}

impl std::fmt::Debug for RedemptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionService")
            .field("default_timezone", &self.default_timezone)
            .finish_non_exhaustive()
    }
}

impl RedemptionService {
    /// Creates a service on the system clock and the default timezone.
    pub fn new(pool: SqlitePool) -> Self {
        RedemptionService {
            pool,
            clock: Arc::new(SystemClock),
            default_timezone: chrono_tz::Europe::Madrid,
        }
    }

    /// Replaces the clock (tests, historic imports).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Timezone for stores whose configured zone is blank or unknown.
    pub fn with_default_timezone(mut self, tz: Tz) -> Self {
        self.default_timezone = tz;
        self
    }

    /// Redeems `request.uses_requested` uses of a pass against a cart.
    ///
    /// Replaying a request with the same idempotency key (32+ characters)
    /// returns the first result and changes nothing.
    pub async fn redeem(
        &self,
        operator: &OperatorContext,
        request: &RedeemRequest,
    ) -> Result<InvoiceResult, RedeemError> {
        validate_operator(operator)?;
        let local_date = validate_redeem_request(request)?;

        let key = request.idempotency_key.as_deref();
        let keyed = honored_key(key).is_some();
        let invoice_id = resolve_invoice_id(key);

        match self.redeem_in_tx(operator, request, local_date, invoice_id, keyed).await {
            Err(RedeemError::Db(DbError::UniqueViolation { field, value })) if keyed => {
                // Lost a race with a request carrying the same key
                let prior = InvoiceRepository::new(self.pool.clone())
                    .find_result_for_pass(&invoice_id.to_string(), request.pass_id)
                    .await?;
                match prior {
                    Some(prior) => {
                        warn!(
                            invoice_id = %prior.invoice_id,
                            pass_id = request.pass_id,
                            "Idempotent replay after unique violation"
                        );
                        Ok(prior)
                    }
                    None => Err(DbError::UniqueViolation { field, value }.into()),
                }
            }
            other => other,
        }
    }

    async fn redeem_in_tx(
        &self,
        operator: &OperatorContext,
        request: &RedeemRequest,
        local_date: NaiveDate,
        invoice_id: Uuid,
        keyed: bool,
    ) -> Result<InvoiceResult, RedeemError> {
        // Dropping `tx` on any early return rolls back
        let mut tx = self.pool.begin().await?;

        let pass = PassRepository::lock_for_update(&mut tx, request.pass_id)
            .await?
            .ok_or(Rejection::PassNotFound(request.pass_id))?;

        if pass.member_id != request.member_id {
            warn!(pass_id = pass.id, member_id = request.member_id, "Pass belongs to another member");
            return Err(Rejection::MemberMismatch {
                pass_id: pass.id,
                member_id: request.member_id,
            }
            .into());
        }

        if keyed {
            let id = invoice_id.to_string();
            if let Some(prior) =
                InvoiceRepository::find_result_for_pass_in(&mut tx, &id, pass.id).await?
            {
                warn!(invoice_id = %prior.invoice_id, pass_id = pass.id, "Idempotent replay");
                return Ok(prior);
            }
            // Same key already spent on another pass
            if InvoiceRepository::exists_in(&mut tx, &id).await? {
                warn!(invoice_id = %id, pass_id = pass.id, "Idempotency key reused on another pass");
                return Err(DbError::duplicate("invoices.id", id).into());
            }
        }

        let store = StoreRepository::fetch(&mut tx, operator.store_id)
            .await?
            .ok_or(Rejection::StoreNotFound(operator.store_id))?;
        let timezone = self.store_timezone(&store);

        let used_today = if pass.max_uses_per_day > 0 {
            PassRepository::used_on(&mut tx, pass.id, local_date).await?
        } else {
            0
        };

        if let Err(rejection) =
            check_redemption(&pass, request.uses_requested, used_today, local_date)
        {
            warn!(
                pass_id = pass.id,
                code = rejection.code(),
                reason = %rejection,
                "Redemption rejected"
            );
            return Err(rejection.into());
        }

        let units = expand_units(&request.cart);
        let allocation = allocate(&units, pass.unit_allocated_base, request.uses_requested);

        let entry = LedgerEntry {
            invoice_id,
            store: &store,
            timezone,
            operator: *operator,
            pass: &pass,
            uses: request.uses_requested,
            cart: &request.cart,
            allocation: &allocation,
            payments: &request.payments,
            device_id: request.device_id.trim(),
            local_date,
            issued_at: self.clock.now(),
        };
        let result = LedgerWriter::commit(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            invoice_id = %result.invoice_id,
            series = %result.series,
            number = result.number,
            pass_id = pass.id,
            uses = request.uses_requested,
            covered = %result.covered,
            final_total = %result.final_total,
            "Redemption committed"
        );

        Ok(result)
    }

    fn store_timezone(&self, store: &StoreConfig) -> Tz {
        match parse_timezone(&store.timezone) {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    store_id = store.id,
                    timezone = %store.timezone,
                    fallback = DEFAULT_TIMEZONE,
                    "Unknown store timezone"
                );
                self.default_timezone
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use passbook_core::clock::FixedClock;
    use passbook_core::{CartLine, Money, PassStatus, PaymentInput, TaxRate};

    use crate::failure::FailureKind;
    use crate::pool::{Database, DbConfig};
    use crate::repository::pass::{NewMemberPass, NewPassPlan};

    const KEY: &str = "5b0c9f1e-3d2a-4c7b-9e8f-1a2b3c4d5e6f";

    struct Fixture {
        db: Database,
        pass_id: i64,
    }

    fn operator() -> OperatorContext {
        OperatorContext {
            store_id: 1,
            user_id: 7,
            shift_id: 3,
        }
    }

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

    fn line(price: i64, qty: i64) -> CartLine {
        CartLine {
            product_id: 1001,
            variant_id: Some(1),
            display_name: "Classic milk tea".to_string(),
            name_zh: Some("经典奶茶".to_string()),
            name_es: Some("Té con leche".to_string()),
            variant_name: Some("L".to_string()),
            variant_name_zh: None,
            variant_name_es: None,
            quantity: qty,
            unit_price_cents: price,
            addons: serde_json::Value::Null,
        }
    }

    fn request(pass_id: i64, uses: i64, cart: Vec<CartLine>) -> RedeemRequest {
        RedeemRequest {
            member_id: 123,
            pass_id,
            uses_requested: uses,
            device_id: "POS-01".to_string(),
            local_date: "2025-11-09".to_string(),
            cart,
            payments: vec![PaymentInput {
                method: "cash".to_string(),
                amount_cents: 250,
            }],
            idempotency_key: None,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 11, 9, 10, 30, 0).unwrap()))
    }

    async fn fixture_with(db: Database, remaining: i64, per_order: Option<i64>, per_day: i64) -> Fixture {
        db.stores().insert(&store()).await.unwrap();
        let plan_id = db
            .passes()
            .create_plan(&NewPassPlan {
                name: "Tea lover 10".to_string(),
                total_uses: 10,
                validity_days: 90,
                max_uses_per_order: per_order,
                max_uses_per_day: per_day,
            })
            .await
            .unwrap();
        let pass_id = db
            .passes()
            .create_pass(&NewMemberPass {
                member_id: 123,
                plan_id,
                remaining_uses: remaining,
                unit_allocated_base: Money::from_cents(300),
                status: PassStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();
        Fixture { db, pass_id }
    }

    async fn fixture(remaining: i64, per_order: Option<i64>, per_day: i64) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fixture_with(db, remaining, per_order, per_day).await
    }

    fn service(db: &Database) -> RedemptionService {
        db.redemption_service().with_clock(clock())
    }

    async fn remaining(f: &Fixture) -> i64 {
        f.db.passes().get_by_id(f.pass_id).await.unwrap().unwrap().remaining_uses
    }

    #[tokio::test]
    async fn test_tea_and_coffee_redemption() {
        let f = fixture(5, None, 0).await;
        let req = request(f.pass_id, 1, vec![line(350, 1), line(200, 1)]);

        let result = service(&f.db).redeem(&operator(), &req).await.unwrap();

        assert_eq!(result.series, "S1Y25");
        assert_eq!(result.number, 1);
        assert_eq!(result.covered.cents(), 300);
        assert_eq!(result.final_total.cents(), 250);
        assert_eq!(remaining(&f).await, 4);

        let records = f.db.redemptions().records_for_invoice(&result.invoice_id).await.unwrap();
        let split: Vec<(i64, i64)> = records
            .iter()
            .map(|r| (r.covered.cents(), r.extra.cents()))
            .collect();
        assert_eq!(split, vec![(300, 50), (0, 200)]);
        assert!(records.iter().all(|r| r.device_id == "POS-01"));

        let madrid = chrono_tz::Europe::Madrid;
        let day = NaiveDate::from_ymd_opt(2025, 11, 9).unwrap();
        let on_day = f.db.redemptions().records_for_pass_on(f.pass_id, day, madrid).await.unwrap();
        assert_eq!(on_day.len(), 2);
        let next_day = day.succ_opt().unwrap();
        assert!(f
            .db
            .redemptions()
            .records_for_pass_on(f.pass_id, next_day, madrid)
            .await
            .unwrap()
            .is_empty());

        let invoice = f.db.invoices().get_by_id(&result.invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.user_id, 7);
        assert_eq!(invoice.shift_id, 3);
        assert_eq!(invoice.issuer_tax_id, "B12345678");
        assert_eq!(invoice.invoice_type, "F2");
        assert_eq!(invoice.compliance_system, "VERIFACTU");
    }

    #[tokio::test]
    async fn test_numbers_increase_per_series() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);

        for expected in 1..=3 {
            let req = request(f.pass_id, 1, vec![line(350, 1)]);
            let result = svc.redeem(&operator(), &req).await.unwrap();
            assert_eq!(result.number, expected);
        }
        assert_eq!(
            f.db.invoices().numbers_in_series("S1Y25").await.unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_series_follows_store_local_year() {
        let f = fixture(5, None, 0).await;
        // 23:30 UTC on Dec 31 is already 2026 in Madrid
        let svc = f.db.redemption_service().with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap(),
        )));
        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.local_date = "2026-01-01".to_string();

        let result = svc.redeem(&operator(), &req).await.unwrap();
        assert_eq!(result.series, "S1Y26");
        assert_eq!(result.number, 1);
    }

    #[tokio::test]
    async fn test_gate_rejections_write_nothing() {
        let f = fixture(1, None, 0).await;
        let svc = service(&f.db);

        let err = svc
            .redeem(&operator(), &request(f.pass_id, 2, vec![line(350, 2)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RedeemError::Rejected(Rejection::InsufficientBalance { remaining: 1, requested: 2 })
        ));

        let err = svc
            .redeem(&operator(), &request(f.pass_id, 0, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.status_class(), 422);

        f.db.passes().set_status(f.pass_id, PassStatus::Suspended).await.unwrap();
        let err = svc
            .redeem(&operator(), &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.to_failure().code, "PASS_INACTIVE");

        assert_eq!(remaining(&f).await, 1);
        assert_eq!(f.db.sequences().current("S1", "S1Y25").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_default_per_order_limit_is_one() {
        let f = fixture(5, None, 0).await;
        let err = service(&f.db)
            .redeem(&operator(), &request(f.pass_id, 2, vec![line(350, 2)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RedeemError::Rejected(Rejection::ExceedsPerOrderLimit { requested: 2, limit: 1 })
        ));
    }

    #[tokio::test]
    async fn test_daily_limit() {
        let f = fixture(10, Some(0), 3).await;
        let svc = service(&f.db);

        // Two 2-use redemptions would reach 4 > 3, so the second is refused
        svc.redeem(&operator(), &request(f.pass_id, 2, vec![line(350, 2)]))
            .await
            .unwrap();
        let err = svc
            .redeem(&operator(), &request(f.pass_id, 2, vec![line(350, 2)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXCEEDS_PER_DAY_LIMIT");

        svc.redeem(&operator(), &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap();
        let err = svc
            .redeem(&operator(), &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);

        // Next local day starts fresh
        let mut next = request(f.pass_id, 1, vec![line(350, 1)]);
        next.local_date = "2025-11-10".to_string();
        svc.redeem(&operator(), &next).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 11, 9).unwrap();
        let usage = f.db.passes().daily_usage(f.pass_id, date).await.unwrap().unwrap();
        assert_eq!(usage.uses_count, 3);
        assert_eq!(remaining(&f).await, 6);
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);

        let err = svc
            .redeem(&operator(), &request(9999, 1, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.status_class(), 404);
        assert_eq!(err.code(), "PASS_NOT_FOUND");

        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.member_id = 999;
        let err = svc.redeem(&operator(), &req).await.unwrap_err();
        assert_eq!(err.code(), "MEMBER_MISMATCH");

        let elsewhere = OperatorContext {
            store_id: 42,
            ..operator()
        };
        let err = svc
            .redeem(&elsewhere, &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_NOT_FOUND");

        assert_eq!(remaining(&f).await, 5);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_open_a_transaction() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);

        let no_shift = OperatorContext {
            shift_id: 0,
            ..operator()
        };
        let err = svc
            .redeem(&no_shift, &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RedeemError::Invalid(_)));

        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.local_date = "09/11/2025".to_string();
        assert_eq!(svc.redeem(&operator(), &req).await.unwrap_err().status_class(), 422);

        let req = request(f.pass_id, 3, vec![line(350, 1)]);
        assert!(matches!(
            svc.redeem(&operator(), &req).await.unwrap_err(),
            RedeemError::Invalid(_)
        ));

        let req = request(f.pass_id, 1, vec![line(i64::MAX, 2)]);
        assert!(matches!(
            svc.redeem(&operator(), &req).await.unwrap_err(),
            RedeemError::Invalid(_)
        ));
        assert_eq!(remaining(&f).await, 5);
    }

    #[tokio::test]
    async fn test_idempotent_retry() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);
        let mut req = request(f.pass_id, 1, vec![line(350, 1), line(200, 1)]);
        req.idempotency_key = Some(KEY.to_string());

        let first = svc.redeem(&operator(), &req).await.unwrap();
        let second = svc.redeem(&operator(), &req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.invoice_id, KEY);
        assert_eq!(remaining(&f).await, 4);
        assert_eq!(f.db.invoices().numbers_in_series("S1Y25").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_replay_succeeds_after_balance_is_spent() {
        let f = fixture(1, None, 0).await;
        let svc = service(&f.db);
        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.idempotency_key = Some("pos01-2025-11-09-order-000000000017".to_string());

        let first = svc.redeem(&operator(), &req).await.unwrap();
        assert_eq!(remaining(&f).await, 0);

        let replay = svc.redeem(&operator(), &req).await.unwrap();
        assert_eq!(first.invoice_id, replay.invoice_id);
    }

    #[tokio::test]
    async fn test_key_reused_on_another_pass_conflicts() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);
        let plan_id = f
            .db
            .passes()
            .create_plan(&NewPassPlan {
                name: "Coffee 5".to_string(),
                total_uses: 5,
                validity_days: 30,
                max_uses_per_order: None,
                max_uses_per_day: 0,
            })
            .await
            .unwrap();
        let other_pass = f
            .db
            .passes()
            .create_pass(&NewMemberPass {
                member_id: 555,
                plan_id,
                remaining_uses: 5,
                unit_allocated_base: Money::from_cents(300),
                status: PassStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();

        let mut first = request(f.pass_id, 1, vec![line(350, 1)]);
        first.idempotency_key = Some(KEY.to_string());
        svc.redeem(&operator(), &first).await.unwrap();

        let mut reused = request(other_pass, 1, vec![line(350, 1)]);
        reused.member_id = 555;
        reused.idempotency_key = Some(KEY.to_string());
        let err = svc.redeem(&operator(), &reused).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Conflict);
        assert_eq!(err.status_class(), 409);
        let other = f.db.passes().get_by_id(other_pass).await.unwrap().unwrap();
        assert_eq!(other.remaining_uses, 5);
        let batch = f.db.redemptions().batch_for_invoice(KEY).await.unwrap().unwrap();
        assert_eq!(batch.pass_id, f.pass_id);
    }

    #[tokio::test]
    async fn test_short_key_is_not_idempotent() {
        let f = fixture(5, None, 0).await;
        let svc = service(&f.db);
        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.idempotency_key = Some("retry-1".to_string());

        let a = svc.redeem(&operator(), &req).await.unwrap();
        let b = svc.redeem(&operator(), &req).await.unwrap();
        assert_ne!(a.invoice_id, b.invoice_id);
        assert_eq!(remaining(&f).await, 3);
    }

    #[tokio::test]
    async fn test_unknown_store_timezone_falls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let f = fixture_with(db, 5, None, 0).await;
        sqlx::query("UPDATE stores SET timezone = 'Atlantis/Capital' WHERE id = 1")
            .execute(f.db.pool())
            .await
            .unwrap();
        // Dec 31 23:30 UTC: 2025 in UTC, 2026 in Madrid
        let svc = f
            .db
            .redemption_service()
            .with_default_timezone(chrono_tz::UTC)
            .with_clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap(),
            )));

        let result = svc
            .redeem(&operator(), &request(f.pass_id, 1, vec![line(350, 1)]))
            .await
            .unwrap();
        assert_eq!(result.series, "S1Y25");
    }

    // =========================================================================
    // Concurrency (file database, several pooled connections)
    // =========================================================================

    async fn file_fixture(dir: &tempfile::TempDir, remaining: i64) -> Fixture {
        let config = DbConfig::new(dir.path().join("ledger.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        fixture_with(db, remaining, Some(0), 0).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_redeems_once() {
        let dir = tempfile::tempdir().unwrap();
        let f = file_fixture(&dir, 1).await;

        let mut req = request(f.pass_id, 1, vec![line(350, 1)]);
        req.idempotency_key = Some(KEY.to_string());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let svc = service(&f.db);
                let req = req.clone();
                tokio::spawn(async move { svc.redeem(&operator(), &req).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().invoice_id);
        }

        assert_eq!(ids[0], ids[1]);
        assert_eq!(remaining(&f).await, 0);
        assert_eq!(f.db.invoices().numbers_in_series("S1Y25").await.unwrap(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let f = file_fixture(&dir, 5).await;

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let svc = service(&f.db);
                let req = request(f.pass_id, 1, vec![line(350, 1)]);
                tokio::spawn(async move { svc.redeem(&operator(), &req).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(RedeemError::Rejected(Rejection::InsufficientBalance { .. })) => {}
                Err(other) => panic!("unexpected failure: {other}"),
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(remaining(&f).await, 0);
        // Gap-free even with rejected attempts in between
        assert_eq!(
            f.db.invoices().numbers_in_series("S1Y25").await.unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }
}
