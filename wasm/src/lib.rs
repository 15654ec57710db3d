//! WebAssembly module for the Passive Edge dashboard
//!
//! Provides client-side previews of server rules:
//! - Material status derivation
//! - Stock operation previews
//! - Order material requirements
//! - Identifier validation and code suggestions
//! - Courier names and tracking links

use std::str::FromStr;

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::identifiers::*;
pub use shared::models::*;
pub use shared::shipping::*;
pub use shared::validation::*;

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

/// Derive a material's stock status ("normal", "low_stock", "out_of_stock")
#[wasm_bindgen]
pub fn derive_material_status(current_stock: &str, min_stock: &str) -> Result<String, JsValue> {
    let current = parse_decimal("current_stock", current_stock)?;
    let min = parse_decimal("min_stock", min_stock)?;
    Ok(MaterialStatus::derive(current, min).as_str().to_string())
}

/// Preview the stock after an operation. Returns the resulting stock as a
/// decimal string, or an error when the operation would be rejected.
#[wasm_bindgen]
pub fn preview_stock_operation(
    operation_type: &str,
    current_stock: &str,
    quantity: &str,
) -> Result<String, JsValue> {
    let op = StockOperationType::from_str(operation_type)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let before = parse_decimal("current_stock", current_stock)?;
    let qty = parse_decimal("quantity", quantity)?;

    let movement = op
        .apply(before, qty)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(movement.after.to_string())
}

/// Compute material requirements for an order quantity.
///
/// Takes a JSON array of BOM lines and returns JSON with the requirements
/// and the warnings shown at order creation.
#[wasm_bindgen]
pub fn compute_order_requirements(bom_json: &str, order_quantity: i32) -> Result<String, JsValue> {
    if order_quantity < 1 {
        return Err(JsValue::from_str("Order quantity must be at least 1"));
    }
    let lines: Vec<BomLine> = serde_json::from_str(bom_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid BOM JSON: {}", e)))?;

    let requirements = compute_requirements(&lines, order_quantity);
    let check = assess_requirements(&requirements);

    serde_json::to_string(&serde_json::json!({
        "material_requirements": requirements,
        "low_stock_materials": check.low_stock_materials,
        "warnings": check.warnings,
    }))
    .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn validate_order_no(order_no: &str) -> bool {
    is_valid_order_no(order_no)
}

#[wasm_bindgen]
pub fn validate_material_code(code: &str) -> bool {
    is_valid_material_code(code)
}

/// Suggest the next unused material code. `used_json` is a JSON array of
/// codes already taken; `prefix` may be empty to search every series.
#[wasm_bindgen]
pub fn suggest_material_code(used_json: &str, prefix: &str) -> Result<Option<String>, JsValue> {
    let used: Vec<String> = serde_json::from_str(used_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid codes JSON: {}", e)))?;
    let prefix = prefix.trim().chars().next().map(|c| c.to_ascii_uppercase());
    Ok(next_available_material_code(&used, prefix))
}

/// Courier tracking page; unknown couriers use the kuaidi100 search
#[wasm_bindgen]
pub fn tracking_url(company_code: &str, tracking_number: &str) -> String {
    shipping_query_url(company_code, tracking_number)
}

#[wasm_bindgen]
pub fn courier_name(company_code: &str) -> String {
    shipping_company_name(company_code)
}

#[wasm_bindgen]
pub fn validate_tracking_number(tracking_number: &str) -> bool {
    is_valid_tracking_number(tracking_number)
}

#[wasm_bindgen]
pub fn guess_courier(tracking_number: &str) -> Option<String> {
    guess_shipping_company(tracking_number).map(str::to_string)
}

/// Courier picker entries as a JSON array of `{code, name, query_url}`
#[wasm_bindgen]
pub fn list_couriers() -> Result<String, JsValue> {
    serde_json::to_string(&SHIPPING_COMPANIES).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Whether an order may move between two statuses
#[wasm_bindgen]
pub fn can_transition_order(from: &str, to: &str) -> bool {
    match (OrderStatus::from_str(from), OrderStatus::from_str(to)) {
        (Ok(from), Ok(to)) => from.can_transition_to(to),
        _ => false,
    }
}

#[wasm_bindgen]
pub fn can_transition_test(from: &str, to: &str) -> bool {
    match (TestStatus::from_str(from), TestStatus::from_str(to)) {
        (Ok(from), Ok(to)) => from.can_transition_to(to),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_material_status() {
        assert_eq!(derive_material_status("150", "200").unwrap(), "low_stock");
        assert_eq!(derive_material_status("0", "200").unwrap(), "out_of_stock");
        assert_eq!(derive_material_status("200", "200").unwrap(), "normal");
    }

    #[test]
    fn test_preview_stock_operation() {
        assert_eq!(preview_stock_operation("out", "1000", "850").unwrap(), "150");
        assert_eq!(preview_stock_operation("adjust", "10", "4").unwrap(), "4");
    }

    #[test]
    fn test_compute_order_requirements() {
        let bom = r#"[{
            "material_id": "6f1c1a4e-2f0b-4c1e-9a53-0c4f1d2b7e11",
            "material_code": "L01",
            "material_name": "Paraffin",
            "required_quantity": "0.9",
            "current_stock": "5",
            "min_stock": "0"
        }]"#;

        let out = compute_order_requirements(bom, 10).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["low_stock_materials"][0], "L01");
        assert_eq!(value["warnings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_identifier_helpers() {
        assert!(validate_order_no("PE-20260117-006J"));
        assert!(!validate_order_no("PE-20260117-006"));
        assert!(validate_material_code("H25"));
        assert!(validate_material_code("P01"));
        assert_eq!(
            suggest_material_code(r#"["A01"]"#, "a").unwrap(),
            Some("A02".to_string())
        );
    }

    #[test]
    fn test_courier_helpers() {
        assert_eq!(courier_name("ems"), "中国邮政");
        assert_eq!(guess_courier("SF1234567890"), Some("SF".to_string()));
        assert!(validate_tracking_number("JD0012345678"));
        assert_eq!(
            tracking_url("unknown", "12345678"),
            "https://www.kuaidi100.com/?keyword=12345678"
        );
        let couriers: serde_json::Value = serde_json::from_str(&list_couriers().unwrap()).unwrap();
        assert_eq!(couriers.as_array().unwrap().len(), SHIPPING_COMPANIES.len());
    }

    #[test]
    fn test_transition_checks() {
        assert!(can_transition_order("pending", "processing"));
        assert!(!can_transition_order("completed", "pending"));
        assert!(can_transition_test("failed", "testing"));
        assert!(!can_transition_test("completed", "failed"));
    }
}
