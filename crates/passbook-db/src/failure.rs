//! # Redemption Failures
//!
//! What a redemption caller sees when it does not get an invoice.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RedeemError                          kind        status   retry?       │
//! │  ───────────────────────────────────  ──────────  ──────   ──────       │
//! │  Rejected(PassNotFound/StoreNotFound) Validation  404      no           │
//! │  Rejected(InvalidUseCount)            Validation  422      no           │
//! │  Rejected(other gate failures)        Validation  409      no           │
//! │  Invalid(ValidationError)             Validation  422      no           │
//! │  Db(UniqueViolation)                  Conflict    409      yes          │
//! │  Db(Busy / PoolExhausted / Conn)      Transient   503      yes          │
//! │  Db(anything else)                    Fatal       500      no           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A retry is always safe: a rolled-back redemption left no trace, and a
//! keyed request that already committed is replayed.

use serde::Serialize;
use thiserror::Error;

use passbook_core::{CoreError, Rejection, ValidationError};

use crate::error::DbError;

/// Errors returned by [`RedemptionService::redeem`](crate::redeem::RedemptionService::redeem).
#[derive(Debug, Error)]
pub enum RedeemError {
    /// The ledger refused the redemption.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The request is malformed.
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),

    /// A database failure; the transaction was rolled back.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<CoreError> for RedeemError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Rejected(r) => RedeemError::Rejected(r),
            CoreError::Validation(v) => RedeemError::Invalid(v),
        }
    }
}

impl From<sqlx::Error> for RedeemError {
    fn from(err: sqlx::Error) -> Self {
        RedeemError::Db(DbError::from(err))
    }
}

/// Failure class, as reported to the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Rejected before anything was written. Do not retry.
    Validation,
    /// A uniqueness race. Retry with the same idempotency key.
    Conflict,
    /// Lock wait or connection trouble. Retry with the same idempotency key.
    Transient,
    /// Schema mismatch or broken invariant. Needs an operator.
    Fatal,
}

impl RedeemError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RedeemError::Rejected(_) | RedeemError::Invalid(_) => FailureKind::Validation,
            RedeemError::Db(DbError::UniqueViolation { .. }) => FailureKind::Conflict,
            RedeemError::Db(e) if e.is_transient() => FailureKind::Transient,
            RedeemError::Db(_) => FailureKind::Fatal,
        }
    }

    /// HTTP-equivalent status class.
    pub fn status_class(&self) -> u16 {
        match self {
            RedeemError::Rejected(r) => r.status_class(),
            RedeemError::Invalid(_) => 422,
            RedeemError::Db(_) => match self.kind() {
                FailureKind::Conflict => 409,
                FailureKind::Transient => 503,
                _ => 500,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Conflict | FailureKind::Transient)
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RedeemError::Rejected(r) => r.code(),
            RedeemError::Invalid(_) => "VALIDATION_ERROR",
            RedeemError::Db(_) => match self.kind() {
                FailureKind::Conflict => "CONFLICT",
                FailureKind::Transient => "BUSY",
                _ => "INTERNAL",
            },
        }
    }

    /// Serializable envelope for the request layer.
    ///
    /// Fatal database detail is logged, not exposed.
    pub fn to_failure(&self) -> Failure {
        let message = match self {
            RedeemError::Db(e) if self.kind() == FailureKind::Fatal => {
                tracing::error!(error = %e, "Redemption failed");
                "ledger operation failed".to_string()
            }
            other => other.to_string(),
        };

        Failure {
            kind: self.kind(),
            code: self.code(),
            message,
            status: self.status_class(),
        }
    }
}

/// Failure envelope.
///
/// ```json
/// { "kind": "VALIDATION", "code": "INSUFFICIENT_BALANCE",
///   "message": "insufficient balance: 1 uses left, 2 requested", "status": 409 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: FailureKind,
    pub code: &'static str,
    pub message: String,
    pub status: u16,
}

impl From<&RedeemError> for Failure {
    fn from(err: &RedeemError) -> Self {
        err.to_failure()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
