//! # Repository Module
//!
//! Database repository implementations for the pass ledger.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  &self methods                    associated fns                        │
//! │  ───────────────────              ───────────────────────────────       │
//! │  run on the pool                  run on a caller's connection          │
//! │  (lookups, seeding)               (&mut SqliteConnection)               │
//! │                                                                         │
//! │  db.invoices().get_by_id(id)      InvoiceRepository::insert(&mut tx, …) │
//! │                                                                         │
//! │  Everything the ledger writes goes through the associated fns, so      │
//! │  it lands in the one transaction the orchestrator opened.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PassRepository`](pass::PassRepository) - Passes, plans, pass lock, daily usage
//! - [`StoreRepository`](store::StoreRepository) - Store invoicing config
//! - [`SequenceRepository`](sequence::SequenceRepository) - Gap-free invoice numbers
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoice headers and lines
//! - [`RedemptionRepository`](redemption::RedemptionRepository) - Batches and records

pub mod invoice;
pub mod pass;
pub mod redemption;
pub mod sequence;
pub mod store;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{DbError, DbResult};

/// Timestamps are stored as fixed-width RFC 3339 text so that text
/// comparison in SQL agrees with time order.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serializes a JSON blob column.
pub(crate) fn blob(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}

/// Parses a JSON blob column.
pub(crate) fn parse_blob(column: &str, raw: &str) -> DbResult<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::Internal(format!("malformed JSON in {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ts_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2025, 11, 9, 23, 0, 0).unwrap();
        let later = whole + chrono::Duration::microseconds(500_000);
        assert_eq!(ts(whole), "2025-11-09T23:00:00.000000Z");
        assert_eq!(ts(whole).len(), ts(later).len());
        assert!(ts(whole) < ts(later));
    }

    #[test]
    fn test_blob_round_trip() {
        assert_eq!(blob(&serde_json::Value::Null), "{}");
        let value = serde_json::json!({"sugar": "50%"});
        assert_eq!(parse_blob("customizations", &blob(&value)).unwrap(), value);
        assert!(parse_blob("customizations", "{oops").is_err());
    }
}
