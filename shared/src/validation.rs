//! Validation utilities shared by the backend and the browser bindings

use rust_decimal::Decimal;

use crate::identifiers::is_valid_material_code;

// ============================================================================
// Inventory Validations
// ============================================================================

/// Validate a material code against the fixed code series
pub fn validate_material_code(code: &str) -> Result<(), &'static str> {
    if is_valid_material_code(code) {
        Ok(())
    } else {
        Err("Material code must belong to a known series (e.g. L01, H12, A05, O25)")
    }
}

/// Validate stock thresholds: both non-negative and min not above max
pub fn validate_stock_thresholds(min_stock: Decimal, max_stock: Decimal) -> Result<(), &'static str> {
    if min_stock < Decimal::ZERO || max_stock < Decimal::ZERO {
        return Err("Stock thresholds cannot be negative");
    }
    if max_stock > Decimal::ZERO && min_stock > max_stock {
        return Err("Minimum stock cannot exceed maximum stock");
    }
    Ok(())
}

/// Validate an order quantity (whole units, at least one)
pub fn validate_order_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 1 {
        return Err("Order quantity must be at least 1");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate username: 3-32 characters, alphanumeric, `_`, `-` or `.`
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters");
    }
    if username.len() > 32 {
        return Err("Username must be at most 32 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err("Username may only contain letters, digits, '_', '-' and '.'");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate a phone number: digits with optional `+`, spaces and dashes
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if allowed && (7..=15).contains(&digits) {
        Ok(())
    } else {
        Err("Invalid phone number format")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_code_validation() {
        assert!(validate_material_code("L01").is_ok());
        assert!(validate_material_code("D15").is_ok());
        assert!(validate_material_code("P01").is_ok());
        assert!(validate_material_code("D16").is_err());
        assert!(validate_material_code("Z01").is_err());
    }

    #[test]
    fn test_stock_thresholds() {
        assert!(validate_stock_thresholds(Decimal::from(10), Decimal::from(100)).is_ok());
        assert!(validate_stock_thresholds(Decimal::from(10), Decimal::ZERO).is_ok());
        assert!(validate_stock_thresholds(Decimal::from(200), Decimal::from(100)).is_err());
        assert!(validate_stock_thresholds(Decimal::from(-1), Decimal::from(100)).is_err());
    }

    #[test]
    fn test_order_quantity() {
        assert!(validate_order_quantity(1).is_ok());
        assert!(validate_order_quantity(0).is_err());
        assert!(validate_order_quantity(-4).is_err());
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("operator.j").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone("+86 138-0013-8000").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("phone-me").is_err());
    }
}
