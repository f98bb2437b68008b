//! # Clock & Local Time
//!
//! UTC timestamps and store-local calendar arithmetic.
//!
//! ## Two Notions of "Today"
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  issued_at / redeemed_at   → UTC instant, microsecond precision        │
//! │  usage_date (daily limit)  → store-local calendar date (YYYY-MM-DD)    │
//! │                                                                         │
//! │  2025-11-09 23:30 Europe/Madrid == 2025-11-09 22:30 UTC                │
//! │  2025-11-10 00:30 Europe/Madrid == 2025-11-09 23:30 UTC  ← new local   │
//! │                                                          day, same UTC │
//! │  to_utc_window("2025-11-10") = [2025-11-09 23:00Z, 2025-11-10 23:00Z)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here reads the system clock except [`SystemClock`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SubsecRound, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Timezone used when a store does not configure one.
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

// =============================================================================
// Clock
// =============================================================================

/// Source of "now" for the ledger.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        utc_now()
    }
}

/// A clock frozen at one instant (tests, replays of historic data).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.trunc_subsecs(6)
    }
}

/// Current UTC time with microsecond precision.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// =============================================================================
// Timezones & Local Dates
// =============================================================================

/// Parses an IANA timezone name.
pub fn parse_timezone(name: &str) -> ValidationResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ValidationError::InvalidFormat {
            field: "timezone".to_string(),
            reason: format!("unknown timezone '{}'", name),
        })
}

/// Parses a `YYYY-MM-DD` local date.
///
/// ## Example
/// ```rust
/// use passbook_core::clock::parse_local_date;
///
/// assert!(parse_local_date("2025-11-09").is_ok());
/// assert!(parse_local_date("09/11/2025").is_err());
/// ```
pub fn parse_local_date(value: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidFormat {
            field: "local_date".to_string(),
            reason: "expected YYYY-MM-DD".to_string(),
        }
    })
}

/// The calendar date of a UTC instant as seen in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Two-digit calendar year of an instant in `tz` (2025 → 25).
pub fn two_digit_year(at: DateTime<Utc>, tz: Tz) -> u32 {
    (at.with_timezone(&tz).year().rem_euclid(100)) as u32
}

/// Converts a local calendar date into the UTC half-open window `[start, end)`.
///
/// ## DST
/// The window spans one local day, so it is 23 or 25 hours long on
/// transition days. A local midnight that does not exist is resolved to the
/// first valid instant after it.
pub fn to_utc_window(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(date, tz);
    let end = local_midnight(date + Duration::days(1), tz);
    (start, end)
}

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump: walk forward to the first real minute
        None => (1..=180)
            .filter_map(|m| {
                tz.from_local_datetime(&(midnight + Duration::minutes(m)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
            .next()
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn madrid() -> Tz {
        parse_timezone(DEFAULT_TIMEZONE).unwrap()
    }

    #[test]
    fn test_utc_now_has_microsecond_precision() {
        let now = utc_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_fixed_clock_truncates() {
        let at = Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 0).unwrap()
            + Duration::nanoseconds(1_234_567);
        let clock = FixedClock(at);
        assert_eq!(clock.now().timestamp_subsec_nanos(), 1_234_000);
    }

    #[test]
    fn test_parse_local_date() {
        let date = parse_local_date("2025-11-09").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 9).unwrap());
        assert!(parse_local_date("2025-13-01").is_err());
        assert!(parse_local_date("").is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Europe/Madrid").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_utc_window_winter() {
        // CET is UTC+1 in November
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let (start, end) = to_utc_window(date, madrid());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 11, 9, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 11, 10, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_utc_window_dst_start_is_23_hours() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let (start, end) = to_utc_window(date, madrid());
        assert_eq!(end - start, Duration::hours(23));
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let at = Utc.with_ymd_and_hms(2025, 11, 9, 23, 30, 0).unwrap();
        assert_eq!(
            local_date(at, madrid()),
            NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
        );
        assert_eq!(
            local_date(at, chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2025, 11, 9).unwrap()
        );
    }

    #[test]
    fn test_two_digit_year_rolls_over_locally() {
        // 23:30 UTC on Dec 31 is already Jan 1 in Madrid
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(two_digit_year(at, madrid()), 26);
        assert_eq!(two_digit_year(at, chrono_tz::UTC), 25);
    }
}
