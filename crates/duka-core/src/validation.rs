//! # Validation Module
//!
//! Input validation for settlement requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (axum)                                          │
//! │  └── Type validation (JSON deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required identifiers, quantity range, cash amount                 │
//! │  └── Phone normalization to 2547XXXXXXXX                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  └── UNIQUE (checkout_request_id), UNIQUE (sale_id)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check here runs before any store or gateway access.

use crate::error::ValidationError;
use crate::MAX_SALE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier accepted from a request.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a required identifier (organization, product, user).
///
/// ```rust
/// use duka_core::validation::validate_required;
///
/// assert!(validate_required("product_id", "p-1").is_ok());
/// assert!(validate_required("product_id", "  ").is_err());
/// ```
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity to sell: `1..=MAX_SALE_QUANTITY`.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity_sold".to_string(),
        });
    }

    if quantity > MAX_SALE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity_sold".to_string(),
            min: 1,
            max: MAX_SALE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the cash handed over. Zero is allowed; underpayment is not
/// rejected here.
pub fn validate_cash_received(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "cash_received".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Phone Normalization
// =============================================================================

/// Normalizes a Kenyan mobile number to the `2547XXXXXXXX` form the gateway
/// expects.
///
/// ## Accepted Inputs
/// ```text
///   0712 345 678      ──► 254712345678
///   +254-712-345-678  ──► 254712345678
///   712345678         ──► 254712345678
///   254712345678      ──► 254712345678
/// ```
///
/// ```rust
/// use duka_core::validation::normalize_phone;
///
/// assert_eq!(normalize_phone("0712 345 678").unwrap(), "254712345678");
/// assert!(normalize_phone("12345").is_err());
/// ```
pub fn normalize_phone(raw: &str) -> ValidationResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::required("phone"));
    }

    let stripped: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if !stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "phone",
            "must contain only digits",
        ));
    }

    let normalized = if let Some(local) = stripped.strip_prefix('0') {
        format!("254{}", local)
    } else if stripped.len() == 9 {
        format!("254{}", stripped)
    } else {
        stripped
    };

    if normalized.len() != 12 || !normalized.starts_with("254") {
        return Err(ValidationError::invalid_format(
            "phone",
            "expected a Kenyan number such as 0712345678 or 254712345678",
        ));
    }

    Ok(normalized)
}

// =============================================================================
// Unit Tests
// =============================================================================
