//! Formula and bill-of-materials models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One bill-of-materials line joined with the material's live stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BomLine {
    pub material_id: Uuid,
    pub material_code: String,
    pub material_name: String,
    /// Quantity of this material per unit of finished product
    pub required_quantity: Option<Decimal>,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
}

/// Material demand of an order quantity against current stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: Uuid,
    pub material_code: String,
    pub material_name: String,
    pub required_quantity: Decimal,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
    pub is_sufficient: bool,
}

impl MaterialRequirement {
    /// Stock left once the requirement is issued
    pub fn stock_after_use(&self) -> Decimal {
        self.current_stock - self.required_quantity
    }

    /// Sufficient now, but issuing it leaves the material under its minimum
    pub fn falls_below_minimum(&self) -> bool {
        self.is_sufficient && self.stock_after_use() < self.min_stock
    }

    pub fn shortfall(&self) -> Decimal {
        if self.is_sufficient {
            Decimal::ZERO
        } else {
            self.required_quantity - self.current_stock
        }
    }
}

/// Compute the material demand for `order_quantity` units of product.
///
/// A line without a per-unit quantity contributes zero demand.
pub fn compute_requirements(lines: &[BomLine], order_quantity: i32) -> Vec<MaterialRequirement> {
    let units = Decimal::from(order_quantity);
    lines
        .iter()
        .map(|line| {
            let required = line.required_quantity.unwrap_or(Decimal::ZERO) * units;
            MaterialRequirement {
                material_id: line.material_id,
                material_code: line.material_code.clone(),
                material_name: line.material_name.clone(),
                required_quantity: required,
                current_stock: line.current_stock,
                min_stock: line.min_stock,
                is_sufficient: line.current_stock >= required,
            }
        })
        .collect()
}

/// Advisory outcome of checking requirements against stock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockCheck {
    pub low_stock_materials: Vec<String>,
    pub warnings: Vec<String>,
}

impl StockCheck {
    pub fn is_clear(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Produce the advisory warnings shown when an order is created.
///
/// Insufficient materials get one warning each and are listed in
/// `low_stock_materials`; sufficient materials that would drop under their
/// minimum after use get a separate warning.
pub fn assess_requirements(requirements: &[MaterialRequirement]) -> StockCheck {
    let mut check = StockCheck::default();

    for req in requirements {
        if !req.is_sufficient {
            check.low_stock_materials.push(req.material_code.clone());
            check.warnings.push(format!(
                "Material {} has insufficient stock (required: {}, current: {})",
                req.material_code, req.required_quantity, req.current_stock
            ));
        } else if req.falls_below_minimum() {
            check.warnings.push(format!(
                "Material {} will fall below minimum stock after use (after use: {}, minimum: {})",
                req.material_code,
                req.stock_after_use(),
                req.min_stock
            ));
        }
    }

    check
}

/// Requirements that cannot be covered by current stock
pub fn shortages(requirements: &[MaterialRequirement]) -> Vec<&MaterialRequirement> {
    requirements.iter().filter(|r| !r.is_sufficient).collect()
}

/// Validate BOM ratios: each in (0, 100], total at most 100
pub fn validate_bom_ratios(ratios: &[Decimal]) -> Result<(), &'static str> {
    let hundred = Decimal::from(100);
    for ratio in ratios {
        if *ratio <= Decimal::ZERO || *ratio > hundred {
            return Err("Each material ratio must be greater than 0 and at most 100");
        }
    }
    let total: Decimal = ratios.iter().sum();
    if total > hundred {
        return Err("Material ratios must not sum to more than 100%");
    }
    Ok(())
}
