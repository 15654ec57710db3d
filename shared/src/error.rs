//! Domain rule violations
//!
//! These are raised by the pure rules in this crate. The backend converts
//! them into HTTP-facing application errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// A business rule was violated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Quantity must be greater than zero")]
    NonPositiveQuantity,

    #[error("Quantity {value} has more than {max_scale} decimal places")]
    QuantityPrecision { value: Decimal, max_scale: u32 },

    #[error("Quantity {value} exceeds the maximum of {max}")]
    QuantityOutOfRange { value: Decimal, max: Decimal },

    #[error("Stock {before} plus {quantity} would exceed the maximum of {max}")]
    StockOverflow {
        before: Decimal,
        quantity: Decimal,
        max: Decimal,
    },

    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },

    #[error("Unknown value for {field}: {value}")]
    UnknownValue { field: &'static str, value: String },
}
