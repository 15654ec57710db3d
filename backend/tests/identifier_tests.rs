//! Identifier format tests
//!
//! Tests for order numbers, test numbers and the material code series.

use chrono::NaiveDate;
use proptest::prelude::*;
use shared::{
    all_material_codes, creator_code_from_order_no, format_order_no, format_test_no,
    is_valid_material_code, is_valid_order_no, next_available_material_code, parse_order_no,
    parse_test_no, total_material_count,
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_documented_order_number() {
        let no = format_order_no(day(2026, 1, 17), 6, 'J');
        assert_eq!(no, "PE-20260117-006J");
        assert!(is_valid_order_no(&no));
        assert_eq!(creator_code_from_order_no(&no), Some('J'));
    }

    #[test]
    fn test_malformed_order_numbers() {
        for bad in [
            "PE-20260117-06J",
            "PE-20260117-006",
            "PE-2026011-006J",
            "pe-20260117-006J",
            "PE-20261317-006J",
            "",
        ] {
            assert!(!is_valid_order_no(bad), "{}", bad);
        }
    }

    #[test]
    fn test_test_number() {
        let no = format_test_no(day(2026, 1, 17), 12);
        assert_eq!(no, "T-20260117-012");
        assert_eq!(parse_test_no(&no), Some((day(2026, 1, 17), 12)));
        assert_eq!(parse_test_no("T-20260117-ABC"), None);
    }

    #[test]
    fn test_material_series() {
        assert_eq!(total_material_count(), 160);
        assert_eq!(all_material_codes().len(), 160);
        assert!(is_valid_material_code("L25"));
        assert!(!is_valid_material_code("L26"));
        assert!(is_valid_material_code("O25"));
        assert!(!is_valid_material_code("A16"));
        assert!(is_valid_material_code("P01"));
        assert!(is_valid_material_code("P25"));
        assert!(!is_valid_material_code("P26"));
    }

    #[test]
    fn test_next_code_skips_used() {
        let used = vec!["L01".to_string(), "L02".to_string()];
        assert_eq!(next_available_material_code(&used, Some('L')), Some("L03".to_string()));
        assert_eq!(next_available_material_code(&used, Some('H')), Some("H01".to_string()));

        let all = all_material_codes();
        assert_eq!(next_available_material_code(&all, None), None);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Formatted order numbers parse back to their parts
    #[test]
    fn prop_order_number_parses(
        offset in 0i64..3650,
        seq in 1u32..1000,
        code in proptest::char::range('A', 'Z'),
    ) {
        let date = day(2024, 1, 1) + chrono::Duration::days(offset);
        let no = format_order_no(date, seq, code);
        let parsed = parse_order_no(&no).unwrap();
        prop_assert_eq!(parsed.date, date);
        prop_assert_eq!(parsed.sequence, seq);
        prop_assert_eq!(parsed.creator_code, code);
    }

    /// Sequences keep order within a day
    #[test]
    fn prop_sequences_sort_within_day(a in 1u32..1000, b in 1u32..1000) {
        prop_assume!(a < b);
        let d = day(2026, 1, 17);
        prop_assert!(format_test_no(d, a) < format_test_no(d, b));
    }
}
