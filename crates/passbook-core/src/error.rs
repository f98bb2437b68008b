//! # Error Types
//!
//! Domain-specific error types for passbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  passbook-core errors (this file)                                      │
//! │  ├── ValidationError  - Malformed request input (boundary checks)      │
//! │  ├── Rejection        - Well-formed redemption the ledger refuses      │
//! │  └── CoreError        - Umbrella over the two above                    │
//! │                                                                         │
//! │  passbook-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── RedeemError      - What the request layer sees (classified)       │
//! │                                                                         │
//! │  Flow: ValidationError/Rejection → CoreError → RedeemError → Failure   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (pass id, counts, limits)
//! 3. Errors are enum variants, never String
//! 4. A rejection never coexists with a write: it is raised before any row changes

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The redemption is well-formed but not admissible.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Rejection
// =============================================================================

/// Reasons the ledger refuses a redemption.
///
/// ## Gate Order
/// ```text
/// PassInactive ─► InvalidUseCount ─► InsufficientBalance
///      ─► ExceedsPerOrderLimit ─► ExceedsPerDayLimit
/// ```
/// The first failing check wins. `PassNotFound`, `MemberMismatch` and
/// `StoreNotFound` are raised by the orchestrator while loading rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("pass inactive: pass {pass_id} is {status}")]
    PassInactive { pass_id: i64, status: String },

    #[error("invalid use count: {requested}")]
    InvalidUseCount { requested: i64 },

    #[error("insufficient balance: {remaining} uses left, {requested} requested")]
    InsufficientBalance { remaining: i64, requested: i64 },

    #[error("exceeds per-order limit: {requested} requested, limit {limit}")]
    ExceedsPerOrderLimit { requested: i64, limit: i64 },

    #[error("exceeds per-day limit: {used} already used on {date}, {requested} requested, limit {limit}")]
    ExceedsPerDayLimit {
        date: String,
        used: i64,
        requested: i64,
        limit: i64,
    },

    /// The pass exists but belongs to another member.
    #[error("pass {pass_id} does not belong to member {member_id}")]
    MemberMismatch { pass_id: i64, member_id: i64 },

    #[error("pass not found: {0}")]
    PassNotFound(i64),

    #[error("store not found: {0}")]
    StoreNotFound(i64),
}

impl Rejection {
    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::PassInactive { .. } => "PASS_INACTIVE",
            Rejection::InvalidUseCount { .. } => "INVALID_USE_COUNT",
            Rejection::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Rejection::ExceedsPerOrderLimit { .. } => "EXCEEDS_PER_ORDER_LIMIT",
            Rejection::ExceedsPerDayLimit { .. } => "EXCEEDS_PER_DAY_LIMIT",
            Rejection::MemberMismatch { .. } => "MEMBER_MISMATCH",
            Rejection::PassNotFound(_) => "PASS_NOT_FOUND",
            Rejection::StoreNotFound(_) => "STORE_NOT_FOUND",
        }
    }

    /// HTTP-equivalent status class.
    ///
    /// Lookups that miss are 404, a non-positive use count is 422,
    /// everything else is a business conflict (409).
    pub fn status_class(&self) -> u16 {
        match self {
            Rejection::PassNotFound(_) | Rejection::StoreNotFound(_) => 404,
            Rejection::InvalidUseCount { .. } => 422,
            _ => 409,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Raised before a transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid date, unknown timezone).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let err = Rejection::InsufficientBalance {
            remaining: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: 1 uses left, 2 requested"
        );

        let err = Rejection::ExceedsPerDayLimit {
            date: "2025-11-09".to_string(),
            used: 2,
            requested: 2,
            limit: 3,
        };
        assert!(err.to_string().starts_with("exceeds per-day limit"));
    }

    #[test]
    fn test_rejection_status_classes() {
        assert_eq!(Rejection::PassNotFound(7).status_class(), 404);
        assert_eq!(
            Rejection::InvalidUseCount { requested: 0 }.status_class(),
            422
        );
        assert_eq!(
            Rejection::MemberMismatch {
                pass_id: 1,
                member_id: 2
            }
            .status_class(),
            409
        );
        assert_eq!(Rejection::StoreNotFound(1).code(), "STORE_NOT_FOUND");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "device_id".to_string(),
        };
        assert_eq!(err.to_string(), "device_id is required");
    }

    #[test]
    fn test_conversions_into_core_error() {
        let core_err: CoreError = ValidationError::MustBePositive {
            field: "pass_id".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = Rejection::PassNotFound(3).into();
        assert!(matches!(core_err, CoreError::Rejected(_)));
    }
}
