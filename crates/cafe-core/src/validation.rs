//! # Validation Module
//!
//! Input validation for everything a customer or cashier can type.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend                                                      │
//! │  ├── Empty name, empty cart, out-of-stock buttons disabled             │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Names, quantities, prices, ratings, percentages                   │
//! │  └── Runs before any lifecycle operation touches the order             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Lifecycle rules (lifecycle.rs)                               │
//! │  └── Status preconditions, closed orders, payment gates                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cafe_core::validation::{validate_customer_name, validate_rating};
//!
//! assert_eq!(validate_customer_name("  Asha ").unwrap(), "Asha");
//! assert!(validate_rating(6).is_err());
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Discount, OrderLine};
use crate::{MAX_BATCH_LINES, MAX_COMMENT_LENGTH, MAX_LINE_QUANTITY, MAX_NAME_LENGTH, MAX_RATING, MIN_RATING};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates and trims the customer name on an order.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 80 characters
pub fn validate_customer_name(name: &str) -> ValidationResult<String> {
    required_text("customer", name, MAX_NAME_LENGTH)
}

/// Normalizes an optional table label. Blank means "no table".
pub fn validate_table(table: Option<&str>) -> ValidationResult<Option<String>> {
    match table.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) if t.chars().count() > MAX_NAME_LENGTH => Err(ValidationError::TooLong {
            field: "table".to_string(),
            max: MAX_NAME_LENGTH,
        }),
        Some(t) => Ok(Some(t.to_string())),
    }
}

/// Validates a tax rule name.
pub fn validate_tax_name(name: &str) -> ValidationResult<String> {
    required_text("tax name", name, MAX_NAME_LENGTH)
}

/// Validates the free-text payment method recorded with a payment.
pub fn validate_payment_method(method: &str) -> ValidationResult<String> {
    required_text("payment method", method, MAX_NAME_LENGTH)
}

/// Validates a client-generated idempotency key.
pub fn validate_idempotency_key(key: &str) -> ValidationResult<String> {
    required_text("idempotency key", key, MAX_NAME_LENGTH)
}

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be at least 1
/// - At most 999 (prevents accidental over-ordering)
pub fn validate_quantity(qty: u32) -> ValidationResult<()> {
    if qty == 0 || qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY as i64,
        });
    }
    Ok(())
}

/// Unit prices may be zero (complimentary items) but never negative.
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::Negative {
            field: "unit price".to_string(),
        });
    }
    Ok(())
}

/// Validates a tax or discount percentage.
pub fn validate_percentage(field: &str, pct: Decimal) -> ValidationResult<()> {
    if pct < Decimal::ZERO {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a discount as entered. Oversized values are fine: billing
/// clamps them to the subtotal.
pub fn validate_discount(discount: &Discount) -> ValidationResult<()> {
    validate_percentage("discount", discount.value)
}

/// Validates a feedback rating (1 to 5 stars).
pub fn validate_rating(rating: u8) -> ValidationResult<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating".to_string(),
            min: MIN_RATING as i64,
            max: MAX_RATING as i64,
        });
    }
    Ok(())
}

/// Validates and trims a feedback comment. Empty comments are allowed.
pub fn validate_comment(comment: &str) -> ValidationResult<String> {
    let trimmed = comment.trim();
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "comment".to_string(),
            max: MAX_COMMENT_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the lines of a new batch.
///
/// ## Rules
/// - At least one line, at most 100
/// - Every line has an item id, a name, a valid quantity and price
pub fn validate_lines(lines: &[OrderLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if lines.len() > MAX_BATCH_LINES {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_BATCH_LINES,
        });
    }
    for line in lines {
        if line.item_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "item id".to_string(),
            });
        }
        if line.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "item name".to_string(),
            });
        }
        validate_quantity(line.qty)?;
        validate_unit_price(line.unit_price)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
