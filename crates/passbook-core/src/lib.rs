//! # passbook-core: Pure Redemption Logic
//!
//! This crate holds every decision the pass ledger makes that does not need
//! a database: how money is represented, whether a redemption is admissible,
//! how a cart's cost is split between a pass and cash, and how the invoice
//! header is derived from that split.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Passbook Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Request layer (HTTP, session, JSON) - external           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ OperatorContext + RedeemRequest        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              passbook-db (RedemptionService)                    │   │
//! │  │     lock pass ─► gate ─► allocate ─► ledger write ─► commit     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ passbook-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌──────────┐ ┌──────┐ ┌────────────┐ ┌─────────┐  │   │
//! │  │  │  money  │ │allocation│ │ gate │ │  invoice   │ │  clock  │  │   │
//! │  │  │  Money  │ │ CartUnit │ │check │ │ totals/VAT │ │ windows │  │   │
//! │  │  └─────────┘ └──────────┘ └──────┘ └────────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Pass, StoreConfig, CartLine, InvoiceResult, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error and rejection types
//! - [`validation`] - Request boundary validation
//! - [`gate`] - Redemption admissibility (the validation gate)
//! - [`allocation`] - Per-use coverage allocation across cart units
//! - [`invoice`] - Invoice series, identifiers, VAT split, payment summary
//! - [`clock`] - UTC now, local calendar dates and day windows
//!
//! ## Example Usage
//!
//! ```rust
//! use passbook_core::allocation::{allocate, CartUnit};
//! use passbook_core::money::Money;
//!
//! let units = vec![
//!     CartUnit::new(0, Money::from_cents(350)),
//!     CartUnit::new(1, Money::from_cents(200)),
//! ];
//!
//! // One use of a pass worth 3.00 per drink
//! let split = allocate(&units, Money::from_cents(300), 1);
//! assert_eq!(split.covered_total.cents(), 300);
//! assert_eq!(split.extra_total.cents(), 250);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod clock;
pub mod error;
pub mod gate;
pub mod invoice;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, Rejection, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single redemption cart.
///
/// ## Business Reason
/// Keeps one ledger transaction (and the writer lock it holds) short.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price in cents (100,000.00).
///
/// A full cart (100 lines of 999 units) at this price still sums far below
/// `i64::MAX`, so cart totals never overflow.
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000;

/// Minimum length an idempotency key must have to be honored.
pub const MIN_IDEMPOTENCY_KEY_LEN: usize = 32;
