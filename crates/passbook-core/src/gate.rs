//! # Validation Gate
//!
//! Decides whether a redemption is admissible against a locked pass.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │  active? │──►│ uses > 0 │──►│ balance  │──►│ per-order │──►│  per-day  │──► Ok
//! └────┬─────┘   └────┬─────┘   └────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!      ▼              ▼              ▼               ▼               ▼
//!  PassInactive  InvalidUseCount  Insufficient  ExceedsPerOrder  ExceedsPerDay
//! ```
//!
//! The gate never reads the database. The caller supplies the day's usage,
//! read inside the same transaction that holds the pass lock.

use chrono::NaiveDate;

use crate::error::Rejection;
use crate::types::Pass;

/// Runs the admissibility checks in order; the first failure wins.
///
/// `used_today` is ignored when the pass has no daily ceiling.
pub fn check_redemption(
    pass: &Pass,
    requested: i64,
    used_today: i64,
    date: NaiveDate,
) -> Result<(), Rejection> {
    if !pass.is_active() {
        return Err(Rejection::PassInactive {
            pass_id: pass.id,
            status: pass.status.as_str().to_string(),
        });
    }

    if requested <= 0 {
        return Err(Rejection::InvalidUseCount { requested });
    }

    if pass.remaining_uses < requested {
        return Err(Rejection::InsufficientBalance {
            remaining: pass.remaining_uses,
            requested,
        });
    }

    if pass.max_uses_per_order > 0 && requested > pass.max_uses_per_order {
        return Err(Rejection::ExceedsPerOrderLimit {
            requested,
            limit: pass.max_uses_per_order,
        });
    }

    if pass.max_uses_per_day > 0 && used_today + requested > pass.max_uses_per_day {
        return Err(Rejection::ExceedsPerDayLimit {
            date: date.format("%Y-%m-%d").to_string(),
            used: used_today,
            requested,
            limit: pass.max_uses_per_day,
        });
    }

    Ok(())
}
