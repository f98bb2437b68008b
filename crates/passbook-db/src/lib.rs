//! # passbook-db: Ledger Storage and Redemption
//!
//! SQLite storage for the pass ledger, plus the orchestrator that turns a
//! redemption request into one atomic ledger write.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Passbook Data Flow                               │
//! │                                                                         │
//! │  Request layer (already authenticated, JSON parsed)                    │
//! │       │  OperatorContext + RedeemRequest                               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   passbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   RedemptionService (redeem.rs)                                 │   │
//! │  │        │  one transaction                                       │   │
//! │  │        ▼                                                        │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ LedgerWriter  │───►│  Repositories │    │  Migrations  │  │   │
//! │  │   │  (ledger.rs)  │    │ pass, store,  │    │  (embedded)  │  │   │
//! │  │   │               │    │ sequence,     │    │ 001_initial  │  │   │
//! │  │   │ invoice +     │    │ invoice,      │    │              │  │   │
//! │  │   │ records +     │    │ redemption    │    │              │  │   │
//! │  │   │ balance       │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  InvoiceResult  or  RedeemError ─► Failure { kind, code, status }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`failure`] - Redemption error classification
//! - [`repository`] - Repository implementations
//! - [`ledger`] - The atomic ledger write
//! - [`redeem`] - The redemption orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passbook_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load()?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let result = db.redemption_service().redeem(&operator, &request).await;
//! match result {
//!     Ok(invoice) => println!("{} #{}", invoice.series, invoice.number),
//!     Err(e) => respond(e.to_failure()),
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod failure;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod redeem;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use error::{DbError, DbResult};
pub use failure::{Failure, FailureKind, RedeemError};
pub use ledger::{LedgerEntry, LedgerWriter};
pub use pool::{Database, DbConfig};
pub use redeem::RedemptionService;

// Repository re-exports for convenience
pub use repository::invoice::InvoiceRepository;
pub use repository::pass::{NewMemberPass, NewPassPlan, PassRepository};
pub use repository::redemption::RedemptionRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::store::StoreRepository;
