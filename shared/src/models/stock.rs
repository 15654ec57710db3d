//! Stock ledger models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Decimal places kept by stock columns
pub const STOCK_SCALE: u32 = 3;

/// Largest value a stock column holds (`NUMERIC(14, 3)`)
pub fn max_stock_quantity() -> Decimal {
    Decimal::new(99_999_999_999_999, STOCK_SCALE)
}

/// Check that a quantity fits a stock column without rounding.
///
/// Trailing zeros do not count towards the scale, so `1.5000` is accepted.
pub fn check_stock_quantity(value: Decimal) -> Result<(), DomainError> {
    if value.normalize().scale() > STOCK_SCALE {
        return Err(DomainError::QuantityPrecision {
            value,
            max_scale: STOCK_SCALE,
        });
    }
    let max = max_stock_quantity();
    if value.abs() > max {
        return Err(DomainError::QuantityOutOfRange { value, max });
    }
    Ok(())
}

/// Kind of stock mutation recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum StockOperationType {
    /// Goods received: stock increases by the quantity
    In,
    /// Goods issued: stock decreases by the quantity, never below zero
    Out,
    /// Stocktake correction: stock becomes the quantity
    Adjust,
}

impl StockOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperationType::In => "in",
            StockOperationType::Out => "out",
            StockOperationType::Adjust => "adjust",
        }
    }

    /// Compute the stock after applying this operation.
    ///
    /// Fails without side effects when the quantity is not positive, does
    /// not fit a stock column, when an `out` would take the stock below zero
    /// or an `in` would take it past [`max_stock_quantity`].
    pub fn apply(&self, before: Decimal, quantity: Decimal) -> Result<StockMovement, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositiveQuantity);
        }
        check_stock_quantity(quantity)?;

        let after = match self {
            StockOperationType::In => {
                let max = max_stock_quantity();
                before
                    .checked_add(quantity)
                    .filter(|after| *after <= max)
                    .ok_or(DomainError::StockOverflow {
                        before,
                        quantity,
                        max,
                    })?
            }
            StockOperationType::Out => {
                let after = before - quantity;
                if after < Decimal::ZERO {
                    return Err(DomainError::InsufficientStock {
                        available: before,
                        requested: quantity,
                    });
                }
                after
            }
            StockOperationType::Adjust => quantity,
        };

        Ok(StockMovement {
            operation: *self,
            quantity,
            before,
            after,
        })
    }
}

impl std::fmt::Display for StockOperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StockOperationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(StockOperationType::In),
            "out" => Ok(StockOperationType::Out),
            "adjust" => Ok(StockOperationType::Adjust),
            other => Err(DomainError::UnknownValue {
                field: "operation_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Before/after snapshot of a single stock mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub operation: StockOperationType,
    pub quantity: Decimal,
    pub before: Decimal,
    pub after: Decimal,
}

impl StockMovement {
    /// Signed change applied to the stock
    pub fn delta(&self) -> Decimal {
        self.after - self.before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_in_adds() {
        let m = StockOperationType::In.apply(dec(100), dec(25)).unwrap();
        assert_eq!(m.after, dec(125));
        assert_eq!(m.delta(), dec(25));
    }

    #[test]
    fn test_out_subtracts_to_zero() {
        let m = StockOperationType::Out.apply(dec(40), dec(40)).unwrap();
        assert_eq!(m.after, Decimal::ZERO);
    }

    #[test]
    fn test_out_rejects_underflow() {
        let err = StockOperationType::Out.apply(dec(5), dec(9)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                available: dec(5),
                requested: dec(9)
            }
        );
    }

    #[test]
    fn test_adjust_sets_absolute_value() {
        let m = StockOperationType::Adjust.apply(dec(300), dec(120)).unwrap();
        assert_eq!(m.before, dec(300));
        assert_eq!(m.after, dec(120));
        assert_eq!(m.delta(), dec(-180));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        for op in [
            StockOperationType::In,
            StockOperationType::Out,
            StockOperationType::Adjust,
        ] {
            assert_eq!(op.apply(dec(10), dec(0)), Err(DomainError::NonPositiveQuantity));
            assert_eq!(op.apply(dec(10), dec(-1)), Err(DomainError::NonPositiveQuantity));
        }
    }

    #[test]
    fn test_sub_column_precision_rejected() {
        let tiny = Decimal::new(6, 4);
        let err = StockOperationType::Out
            .apply(Decimal::new(1, 3), tiny)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::QuantityPrecision {
                value: tiny,
                max_scale: STOCK_SCALE
            }
        );
        assert!(StockOperationType::In.apply(dec(1), Decimal::new(4, 4)).is_err());
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        let m = StockOperationType::In
            .apply(dec(1), Decimal::new(15000, 4))
            .unwrap();
        assert_eq!(m.after, Decimal::new(25, 1));
    }

    #[test]
    fn test_quantity_above_column_range_rejected() {
        let too_big = Decimal::new(100_000_000_000, 0);
        for op in [
            StockOperationType::In,
            StockOperationType::Out,
            StockOperationType::Adjust,
        ] {
            assert!(matches!(
                op.apply(dec(0), too_big),
                Err(DomainError::QuantityOutOfRange { .. })
            ));
        }
        assert!(StockOperationType::Adjust.apply(dec(0), max_stock_quantity()).is_ok());
    }

    #[test]
    fn test_in_never_overflows() {
        let err = StockOperationType::In
            .apply(max_stock_quantity(), Decimal::new(1, 3))
            .unwrap_err();
        assert!(matches!(err, DomainError::StockOverflow { .. }));

        // A corrupt stock value near the type's limit still fails cleanly
        let err = StockOperationType::In.apply(Decimal::MAX, dec(1)).unwrap_err();
        assert!(matches!(err, DomainError::StockOverflow { .. }));
    }

    #[test]
    fn test_parse_operation_type() {
        assert_eq!("out".parse::<StockOperationType>().unwrap(), StockOperationType::Out);
        assert!("transfer".parse::<StockOperationType>().is_err());
    }
}
