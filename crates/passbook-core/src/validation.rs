//! # Validation Module
//!
//! Boundary validation for redemption requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (external)                                     │
//! │  └── JSON parsing into RedeemRequest / OperatorContext                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - shape of the request                           │
//! │  ├── ids positive, cart non-empty, quantities and prices in range     │
//! │  └── local date parses                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Gate (gate.rs) - admissibility against the locked pass row   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  ├── CHECK (remaining_uses >= 0)                                       │
//! │  └── UNIQUE (series, number), PRIMARY KEY (invoice id)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::clock::parse_local_date;
use crate::error::ValidationError;
use crate::types::{OperatorContext, RedeemRequest};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an integer identity supplied by the request layer.
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a device identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    let device_id = device_id.trim();

    if device_id.is_empty() {
        return Err(ValidationError::Required {
            field: "device_id".to_string(),
        });
    }

    if device_id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "device_id".to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates the operator context (store, cashier, open shift).
///
/// A missing shift means the cashier never opened one; redemption requires it.
pub fn validate_operator(ctx: &OperatorContext) -> ValidationResult<()> {
    validate_id("store_id", ctx.store_id)?;
    validate_id("user_id", ctx.user_id)?;
    validate_id("shift_id", ctx.shift_id)?;
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
/// - Must not exceed MAX_UNIT_PRICE_CENTS (100,000.00)
///
/// ## Example
/// ```rust
/// use passbook_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(350).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "vat_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size (number of lines).
///
/// ## Rules
/// - At least one line
/// - At most MAX_CART_ITEMS (100)
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "cart".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Request Validator
// =============================================================================

/// Validates the shape of a redemption request and returns its local date.
///
/// ## Rules
/// - member and pass ids positive
/// - device id present
/// - local date is `YYYY-MM-DD`
/// - cart has 1..=100 lines, each with a valid quantity and price
/// - uses requested does not exceed the number of cart units
///
/// A non-positive use count is NOT rejected here: the gate owns that
/// decision and reports it as "invalid use count".
pub fn validate_redeem_request(req: &RedeemRequest) -> ValidationResult<NaiveDate> {
    validate_id("member_id", req.member_id)?;
    validate_id("pass_id", req.pass_id)?;
    validate_device_id(&req.device_id)?;
    let date = parse_local_date(&req.local_date)?;

    validate_cart_size(req.cart.len())?;
    for line in &req.cart {
        validate_id("product_id", line.product_id)?;
        validate_quantity(line.quantity)?;
        validate_price_cents(line.unit_price_cents)?;
        if line.display_name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "display_name".to_string(),
            });
        }
    }

    let units: i64 = req.cart.iter().map(|l| l.quantity).sum();
    if req.uses_requested > units {
        return Err(ValidationError::OutOfRange {
            field: "uses_requested".to_string(),
            min: 1,
            max: units,
        });
    }

    Ok(date)
}

// =============================================================================
// Unit Tests
// =============================================================================
