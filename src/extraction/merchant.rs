//! Merchant name guess from the receipt header

use lazy_static::lazy_static;
use regex::Regex;

/// Lines considered when looking for the merchant
pub const MERCHANT_SCAN_LINES: usize = 5;

/// Returned when no header line qualifies
pub const UNKNOWN_MERCHANT: &str = "Unknown";

lazy_static! {
    static ref NOT_A_NAME: Regex = Regex::new(
        r"(?i)\b(?:total|subtotal|amount|date|time|invoice|receipt|bill|tax|gst|gstin|vat|cash|tel|phone|ph|mob|www|http|terminal|txn|transaction|welcome|thank)\b|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}"
    )
    .expect("NOT_A_NAME regex should compile");
}

/// First header line that reads like a name
///
/// Needs three letters, more letters than digits, and no receipt keyword
/// or date.
pub fn extract_merchant(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .take(MERCHANT_SCAN_LINES)
        .map(|line| line.trim())
        .find(|line| {
            let letters = line.chars().filter(|c| c.is_alphabetic()).count();
            let digits = line.chars().filter(|c| c.is_ascii_digit()).count();
            letters >= 3 && letters > digits && !NOT_A_NAME.is_match(line)
        })
        .map(|line| {
            line.trim_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != '&')
                .to_string()
        })
        .filter(|name| !name.is_empty())
}
