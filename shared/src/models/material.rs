//! Raw material models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Stock status of a material, always derived from its stock levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Normal,
    LowStock,
    OutOfStock,
}

impl MaterialStatus {
    /// Derive the status from current and minimum stock.
    ///
    /// `out_of_stock` when stock <= 0, `low_stock` when 0 < stock < min,
    /// `normal` otherwise.
    pub fn derive(current_stock: Decimal, min_stock: Decimal) -> Self {
        if current_stock <= Decimal::ZERO {
            MaterialStatus::OutOfStock
        } else if current_stock < min_stock {
            MaterialStatus::LowStock
        } else {
            MaterialStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialStatus::Normal => "normal",
            MaterialStatus::LowStock => "low_stock",
            MaterialStatus::OutOfStock => "out_of_stock",
        }
    }
}

impl std::fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MaterialStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(MaterialStatus::Normal),
            "low_stock" => Ok(MaterialStatus::LowStock),
            "out_of_stock" => Ok(MaterialStatus::OutOfStock),
            other => Err(DomainError::UnknownStatus {
                entity: "material",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_derive_boundaries() {
        assert_eq!(MaterialStatus::derive(dec(0), dec(200)), MaterialStatus::OutOfStock);
        assert_eq!(MaterialStatus::derive(dec(150), dec(200)), MaterialStatus::LowStock);
        assert_eq!(MaterialStatus::derive(dec(200), dec(200)), MaterialStatus::Normal);
        assert_eq!(MaterialStatus::derive(dec(1000), dec(200)), MaterialStatus::Normal);
    }

    #[test]
    fn test_zero_minimum_never_low() {
        assert_eq!(MaterialStatus::derive(Decimal::new(1, 2), dec(0)), MaterialStatus::Normal);
        assert_eq!(MaterialStatus::derive(dec(0), dec(0)), MaterialStatus::OutOfStock);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            MaterialStatus::Normal,
            MaterialStatus::LowStock,
            MaterialStatus::OutOfStock,
        ] {
            assert_eq!(status.as_str().parse::<MaterialStatus>().unwrap(), status);
        }
        assert!("empty".parse::<MaterialStatus>().is_err());
    }

    proptest! {
        #[test]
        fn prop_derive_is_total_and_consistent(stock in 0i64..100_000, min in 0i64..100_000) {
            let stock = Decimal::new(stock, 2);
            let min = Decimal::new(min, 2);
            let status = MaterialStatus::derive(stock, min);
            match status {
                MaterialStatus::OutOfStock => prop_assert!(stock <= Decimal::ZERO),
                MaterialStatus::LowStock => prop_assert!(stock > Decimal::ZERO && stock < min),
                MaterialStatus::Normal => prop_assert!(stock > Decimal::ZERO && stock >= min),
            }
        }
    }
}
