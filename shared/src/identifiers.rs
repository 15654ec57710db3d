//! Document identifier formats
//!
//! - Order numbers: `PE-YYYYMMDD-SSS` followed by the creator code letter,
//!   e.g. `PE-20260117-006J`
//! - Test numbers: `T-YYYYMMDD-SSS`
//! - Material codes: fixed letter series such as `L01`..`L25` and `P01`..`P25`
//!
//! Sequences are per day and handed out by the database, so the formatting
//! here never has to guess at uniqueness.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const ORDER_PREFIX: &str = "PE";
pub const TEST_PREFIX: &str = "T";

// ============================================================================
// Order numbers
// ============================================================================

/// Components of a parsed order number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNumber {
    pub prefix: String,
    pub date: NaiveDate,
    pub sequence: u32,
    pub creator_code: char,
}

/// Format an order number. Sequences above 999 widen the numeric part.
pub fn format_order_no(date: NaiveDate, sequence: u32, creator_code: char) -> String {
    format!(
        "{}-{}-{:03}{}",
        ORDER_PREFIX,
        date.format("%Y%m%d"),
        sequence,
        creator_code.to_ascii_uppercase()
    )
}

/// Parse an order number, returning `None` when it is malformed
pub fn parse_order_no(order_no: &str) -> Option<OrderNumber> {
    let mut parts = order_no.splitn(3, '-');
    let prefix = parts.next()?;
    let date = parts.next()?;
    let tail = parts.next()?;

    if prefix.len() != 2 || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let date = parse_compact_date(date)?;

    let creator_code = tail.chars().last()?;
    if !creator_code.is_ascii_uppercase() {
        return None;
    }
    let digits = &tail[..tail.len() - 1];
    if digits.len() < 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(OrderNumber {
        prefix: prefix.to_string(),
        date,
        sequence: digits.parse().ok()?,
        creator_code,
    })
}

pub fn is_valid_order_no(order_no: &str) -> bool {
    parse_order_no(order_no).is_some()
}

/// Creator code embedded in an order number
pub fn creator_code_from_order_no(order_no: &str) -> Option<char> {
    parse_order_no(order_no).map(|p| p.creator_code)
}

/// Normalize an explicit creator code: exactly one ASCII letter, upper-cased
pub fn normalize_creator_code(raw: &str) -> Result<char, &'static str> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err("Creator code must be a single letter"),
    }
}

/// Fallback creator code: the first letter of the creator's name
pub fn creator_code_from_name(name: &str) -> Option<char> {
    name.trim()
        .chars()
        .next()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
}

// ============================================================================
// Test numbers
// ============================================================================

pub fn format_test_no(date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:03}", TEST_PREFIX, date.format("%Y%m%d"), sequence)
}

/// Parse a test number into its date and sequence
pub fn parse_test_no(test_no: &str) -> Option<(NaiveDate, u32)> {
    let mut parts = test_no.splitn(3, '-');
    if parts.next()? != TEST_PREFIX {
        return None;
    }
    let date = parse_compact_date(parts.next()?)?;
    let seq = parts.next()?;
    if seq.len() < 3 || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((date, seq.parse().ok()?))
}

fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

// ============================================================================
// Material codes
// ============================================================================

/// A lettered series of material codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaterialSeries {
    pub prefix: char,
    pub start: u32,
    pub end: u32,
}

impl MaterialSeries {
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn codes(&self) -> impl Iterator<Item = String> + '_ {
        (self.start..=self.end).map(move |n| format!("{}{:02}", self.prefix, n))
    }
}

pub const MATERIAL_SERIES: [MaterialSeries; 8] = [
    MaterialSeries { prefix: 'L', start: 1, end: 25 },
    MaterialSeries { prefix: 'H', start: 1, end: 25 },
    MaterialSeries { prefix: 'A', start: 1, end: 15 },
    MaterialSeries { prefix: 'B', start: 1, end: 15 },
    MaterialSeries { prefix: 'C', start: 1, end: 15 },
    MaterialSeries { prefix: 'D', start: 1, end: 15 },
    MaterialSeries { prefix: 'O', start: 1, end: 25 },
    // Phase-change base materials
    MaterialSeries { prefix: 'P', start: 1, end: 25 },
];

/// Every valid material code, in series order
pub fn all_material_codes() -> Vec<String> {
    MATERIAL_SERIES.iter().flat_map(|s| s.codes()).collect()
}

pub fn total_material_count() -> u32 {
    MATERIAL_SERIES.iter().map(|s| s.count()).sum()
}

/// Parse a material code into its series prefix and number
pub fn parse_material_code(code: &str) -> Option<(char, u32)> {
    let mut chars = code.chars();
    let prefix = chars.next()?;
    let digits = chars.as_str();
    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    let series = MATERIAL_SERIES.iter().find(|s| s.prefix == prefix)?;
    if number < series.start || number > series.end {
        return None;
    }
    Some((prefix, number))
}

pub fn is_valid_material_code(code: &str) -> bool {
    parse_material_code(code).is_some()
}

pub fn material_series(code: &str) -> Option<&'static MaterialSeries> {
    let (prefix, _) = parse_material_code(code)?;
    MATERIAL_SERIES.iter().find(|s| s.prefix == prefix)
}

/// First unused code, optionally restricted to one series
pub fn next_available_material_code(used: &[String], prefix: Option<char>) -> Option<String> {
    MATERIAL_SERIES
        .iter()
        .filter(|s| prefix.map_or(true, |p| s.prefix == p))
        .flat_map(|s| s.codes())
        .find(|code| !used.iter().any(|u| u == code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format_order_no() {
        assert_eq!(format_order_no(day(2026, 1, 17), 6, 'j'), "PE-20260117-006J");
        assert_eq!(format_order_no(day(2026, 1, 17), 1234, 'A'), "PE-20260117-1234A");
    }

    #[test]
    fn test_parse_order_no() {
        let parsed = parse_order_no("PE-20260117-006J").unwrap();
        assert_eq!(parsed.prefix, "PE");
        assert_eq!(parsed.date, day(2026, 1, 17));
        assert_eq!(parsed.sequence, 6);
        assert_eq!(parsed.creator_code, 'J');
    }

    #[test]
    fn test_parse_order_no_rejects_malformed() {
        assert!(parse_order_no("PE-20260117-06J").is_none());
        assert!(parse_order_no("PE-20261317-006J").is_none());
        assert!(parse_order_no("pe-20260117-006J").is_none());
        assert!(parse_order_no("PE-20260117-006j").is_none());
        assert!(parse_order_no("PE-20260117-006").is_none());
        assert!(parse_order_no("").is_none());
    }

    #[test]
    fn test_creator_codes() {
        assert_eq!(normalize_creator_code("j"), Ok('J'));
        assert!(normalize_creator_code("JK").is_err());
        assert!(normalize_creator_code("7").is_err());
        assert_eq!(creator_code_from_name("wang"), Some('W'));
        assert_eq!(creator_code_from_name("  "), None);
        assert_eq!(creator_code_from_order_no("PE-20260117-006J"), Some('J'));
    }

    #[test]
    fn test_test_no() {
        let no = format_test_no(day(2026, 10, 19), 42);
        assert_eq!(no, "T-20261019-042");
        assert_eq!(parse_test_no(&no), Some((day(2026, 10, 19), 42)));
        assert!(parse_test_no("T-20261019-4K2").is_none());
    }

    #[test]
    fn test_material_codes() {
        assert_eq!(total_material_count(), 160);
        assert_eq!(all_material_codes().len(), 160);
        assert!(is_valid_material_code("L01"));
        assert!(is_valid_material_code("P01"));
        assert!(is_valid_material_code("P02"));
        assert!(is_valid_material_code("O25"));
        assert!(!is_valid_material_code("A16"));
        assert!(!is_valid_material_code("L00"));
        assert!(!is_valid_material_code("X01"));
        assert!(!is_valid_material_code("L1"));
        assert_eq!(material_series("C07").map(|s| s.prefix), Some('C'));
        assert_eq!(material_series("P01").map(|s| s.prefix), Some('P'));
    }

    #[test]
    fn test_next_available_material_code() {
        let used = vec!["L01".to_string(), "L02".to_string()];
        assert_eq!(next_available_material_code(&used, None), Some("L03".to_string()));
        assert_eq!(next_available_material_code(&used, Some('B')), Some("B01".to_string()));

        let all_b: Vec<String> = MATERIAL_SERIES[3].codes().collect();
        assert_eq!(next_available_material_code(&all_b, Some('B')), None);
    }
}
