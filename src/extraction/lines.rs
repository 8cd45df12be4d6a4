//! Line splitting and number scanning shared by the extractors

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::normalize::{parse_number_token, repair_confusables};

lazy_static! {
    // Digit groups joined by single separators: 28.25, 1,234.56, 1.234,56, 2825
    static ref NUMBER_TOKEN: Regex =
        Regex::new(r"\d+(?:[.,]\d+)*").expect("NUMBER_TOKEN regex should compile");

    /// Lines that name the amount actually paid
    pub static ref TOTAL_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:total|amount|amt|net|payable|due|balance)\b"
    )
    .expect("TOTAL_KEYWORD regex should compile");

    pub static ref SUBTOTAL: Regex =
        Regex::new(r"(?i)\bsub\s*-?\s*total\b").expect("SUBTOTAL regex should compile");

    pub static ref TAX_KEYWORD: Regex = Regex::new(r"(?i)\b(?:gst|cgst|sgst|igst|vat|tax)\b")
        .expect("TAX_KEYWORD regex should compile");
}

/// One number found on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberMatch {
    /// Text as it appears in the source line
    pub raw: String,
    /// Canonical digits-and-point form
    pub normalized: String,
    /// Literal value, no cents heuristic
    pub value: Decimal,
    /// Whether the token carried a separator
    pub had_separator: bool,
    /// Ends in a two-digit fraction (`12.50`, `12,50`)
    pub money_like: bool,
    /// Byte offset in the line
    pub start: usize,
}

/// Split OCR text into trimmed, non-empty lines with collapsed whitespace
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_fragment_separator(c: Option<char>, neighbour: Option<char>) -> bool {
    matches!(c, Some('/') | Some(':') | Some('-')) && neighbour.is_some_and(|n| n.is_ascii_digit())
}

/// Find every amount-like number on a line
///
/// Confusable glyphs are repaired first. Percentages, date fragments
/// (`15/03/2024`, `15-03-2024`) and clock times are skipped.
pub fn find_numbers(line: &str) -> Vec<NumberMatch> {
    // Repair maps ASCII to ASCII one for one, so offsets line up with `line`
    let repaired = repair_confusables(line);
    let mut found = Vec::new();

    for m in NUMBER_TOKEN.find_iter(&repaired) {
        let before = repaired[..m.start()].chars().next_back();
        let before_that = repaired[..m.start()].chars().rev().nth(1);
        let mut after_iter = repaired[m.end()..].chars();
        let after = after_iter.next();
        let after_that = after_iter.next();

        if is_fragment_separator(before, before_that) || is_fragment_separator(after, after_that) {
            continue;
        }
        if repaired[m.end()..].trim_start().starts_with('%') {
            continue;
        }

        let Some(parsed) = parse_number_token(m.as_str()) else {
            continue;
        };
        let text = m.as_str();
        let money_like = text.len() >= 3 && {
            let bytes = text.as_bytes();
            let sep = bytes[text.len() - 3];
            (sep == b'.' || sep == b',')
                && bytes[text.len() - 2].is_ascii_digit()
                && bytes[text.len() - 1].is_ascii_digit()
        };

        found.push(NumberMatch {
            raw: line.get(m.start()..m.end()).unwrap_or(text).to_string(),
            normalized: parsed.normalized,
            value: parsed.value,
            had_separator: parsed.had_separator,
            money_like,
            start: m.start(),
        });
    }

    found
}

/// Last money-shaped number on a line
pub fn last_money(line: &str) -> Option<NumberMatch> {
    find_numbers(line).into_iter().filter(|n| n.money_like).last()
}

/// Last number of any shape on a line
pub fn last_number(line: &str) -> Option<NumberMatch> {
    find_numbers(line).into_iter().last()
}

pub fn has_fraction(value: Decimal) -> bool {
    value.fract() != Decimal::ZERO
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn values(line: &str) -> Vec<Decimal> {
        find_numbers(line).into_iter().map(|n| n.value).collect()
    }

    #[test]
    fn test_split_lines_drops_blank_lines() {
        let lines = split_lines("  ACME  STORE \n\n\t\nTOTAL   28.25\n");
        assert_eq!(lines, vec!["ACME STORE", "TOTAL 28.25"]);
    }

    #[test]
    fn test_find_numbers_skips_percent_dates_and_times() {
        assert_eq!(
            values("CGST 9% 9.00"),
            vec![Decimal::from_str("9.00").unwrap()]
        );
        assert!(values("Date 15/03/2024 12:30").is_empty());
        assert!(values("15-03-2024").is_empty());
        assert_eq!(values("Total:28.25"), vec![Decimal::from_str("28.25").unwrap()]);
        assert_eq!(values("Qty 2 x 4.50"), vec![Decimal::from(2), Decimal::from_str("4.50").unwrap()]);
    }

    #[test]
    fn test_find_numbers_repairs_and_keeps_raw() {
        let found = find_numbers("TOTAL 2O.5O");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, "2O.5O");
        assert_eq!(found[0].normalized, "20.50");
        assert!(found[0].money_like);
    }

    #[test]
    fn test_last_money_prefers_money_shape() {
        let found = last_money("Items 3 Total 45.10 Ref 7781").unwrap();
        assert_eq!(found.value, Decimal::from_str("45.10").unwrap());
        assert_eq!(last_number("Items 3 Total 45.10 Ref 7781").unwrap().raw, "7781");
    }
}
