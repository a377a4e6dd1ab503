//! Domain error model.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business failure that is reported back to
/// the caller as a user-displayable message. None of them is fatal to the
/// process. Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A field failed validation (e.g. empty name, malformed certificate).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The expected-return date of a loan lies in the past.
    #[error("expected return date {expected} is before today ({today})")]
    InvalidDate { expected: NaiveDate, today: NaiveDate },

    /// The same equipment was requested twice in one loan.
    #[error("equipment '{equipment}' was added to the loan more than once")]
    DuplicateLineItem { equipment: String },

    /// A loan line asks for more units than are currently available.
    #[error(
        "insufficient stock for '{equipment}': requested {requested}, available {available} (short by {shortfall})"
    )]
    InsufficientStock {
        equipment: String,
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    /// A quantity was zero or negative.
    #[error("quantity must be greater than zero (got {0})")]
    InvalidQuantity(i64),

    /// A return asks for more units than are still pending on the line item.
    #[error("return quantity {requested} exceeds the pending quantity ({pending})")]
    ExceedsPending { requested: i64, pending: i64 },

    /// A deletion is blocked by dependent records.
    #[error("cannot delete: {0}")]
    ReferentialBlock(String),

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness rule was violated (duplicate name, registration number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain invariant was violated (typically corrupt stored state).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_date(expected: NaiveDate, today: NaiveDate) -> Self {
        Self::InvalidDate { expected, today }
    }

    pub fn duplicate_line_item(equipment: impl Into<String>) -> Self {
        Self::DuplicateLineItem {
            equipment: equipment.into(),
        }
    }

    pub fn insufficient_stock(equipment: impl Into<String>, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            equipment: equipment.into(),
            requested,
            available,
            shortfall: requested - available,
        }
    }

    pub fn invalid_quantity(quantity: i64) -> Self {
        Self::InvalidQuantity(quantity)
    }

    pub fn exceeds_pending(requested: i64, pending: i64) -> Self {
        Self::ExceedsPending { requested, pending }
    }

    pub fn referential_block(msg: impl Into<String>) -> Self {
        Self::ReferentialBlock(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidDate { .. } => "invalid_date",
            DomainError::DuplicateLineItem { .. } => "duplicate_line_item",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InvalidQuantity(_) => "invalid_quantity",
            DomainError::ExceedsPending { .. } => "exceeds_pending",
            DomainError::ReferentialBlock(_) => "referential_block",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_reports_shortfall() {
        let err = DomainError::insufficient_stock("Helmet", 3, 2);
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                equipment: "Helmet".to_string(),
                requested: 3,
                available: 2,
                shortfall: 1,
            }
        );
        assert!(err.to_string().contains("short by 1"));
    }

    #[test]
    fn exceeds_pending_message_names_pending_amount() {
        let err = DomainError::exceeds_pending(7, 6);
        assert_eq!(err.to_string(), "return quantity 7 exceeds the pending quantity (6)");
        assert_eq!(err.code(), "exceeds_pending");
    }
}
