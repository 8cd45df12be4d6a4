//! # Normalization Module
//!
//! Pure functions that turn noisy OCR tokens into canonical values:
//!
//! - confusable-character repair (`O` read for `0`, `l` read for `1`, ...)
//! - monetary token parsing with comma/period disambiguation
//! - numeric (`15/03/2024`) and textual (`15th March 2024`) date parsing
//!
//! Nothing here keeps state; the reference date used for two-digit years is
//! always passed in.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

/// Earliest year accepted for any parsed date
pub const MIN_YEAR: i32 = 1970;

/// Confusable glyph -> digit table
const CONFUSABLES: [(char, char); 7] = [
    ('O', '0'),
    ('o', '0'),
    ('I', '1'),
    ('l', '1'),
    ('|', '1'),
    ('S', '5'),
    ('s', '5'),
];

/// Characters that mark a token as numeric context
const NUMERIC_PUNCTUATION: [char; 4] = [',', '.', ':', '-'];

const MONTHS: [(&str, u32); 24] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("sept", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

fn confusable_digit(c: char) -> Option<char> {
    CONFUSABLES
        .iter()
        .find(|(glyph, _)| *glyph == c)
        .map(|(_, digit)| *digit)
}

fn is_run_char(c: char) -> bool {
    c.is_ascii_digit() || confusable_digit(c).is_some() || matches!(c, ',' | '.' | ':' | '-' | '/')
}

/// Replace confusable glyphs with digits inside numeric runs
///
/// Works token by token. A token is only touched if it already contains a
/// digit or one of `, . : -`, and within it only runs that contain a real
/// digit are repaired. A run that starts in the middle of a word keeps its
/// leading letters, so `Rs.1OO` becomes `Rs.100` rather than `R5.100`.
pub fn repair_confusables(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();

    for c in text.chars() {
        if c.is_whitespace() {
            out.push_str(&repair_token(&token));
            token.clear();
            out.push(c);
        } else {
            token.push(c);
        }
    }
    out.push_str(&repair_token(&token));
    out
}

fn repair_token(token: &str) -> String {
    let numeric_context = token
        .chars()
        .any(|c| c.is_ascii_digit() || NUMERIC_PUNCTUATION.contains(&c));
    if !numeric_context {
        return token.to_string();
    }

    let chars: Vec<char> = token.chars().collect();
    let mut out = String::with_capacity(token.len());
    let mut i = 0;

    while i < chars.len() {
        if !is_run_char(chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && is_run_char(chars[i]) {
            i += 1;
        }
        let run = &chars[start..i];

        if !run.iter().any(|c| c.is_ascii_digit()) {
            out.extend(run);
            continue;
        }

        // Mid-word runs keep their leading letters
        let mut skip = 0;
        if start > 0 && chars[start - 1].is_alphabetic() {
            while skip < run.len() && confusable_digit(run[skip]).is_some() {
                skip += 1;
            }
        }
        out.extend(&run[..skip]);
        out.extend(
            run[skip..]
                .iter()
                .map(|&c| confusable_digit(c).unwrap_or(c)),
        );
    }

    out
}

/// A parsed monetary token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberToken {
    pub value: Decimal,
    /// Canonical form: digits with at most one `.`
    pub normalized: String,
    /// Whether the source carried a decimal or thousands separator
    pub had_separator: bool,
}

/// Parse a monetary token literally, without the cents heuristic
///
/// Currency symbols, letters and signs are stripped. A comma followed by
/// exactly two trailing digits is the decimal separator; any other comma is
/// a thousands separator. With several periods, only a last one followed by
/// two digits is kept as decimal point.
pub fn parse_number_token(token: &str) -> Option<NumberToken> {
    let repaired = repair_confusables(token);
    let kept: String = repaired
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let cleaned = kept.trim_matches(|c| c == ',' || c == '.');
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let had_separator = cleaned.contains([',', '.']);
    let normalized = canonicalize_separators(cleaned);
    let value = Decimal::from_str(&normalized).ok()?;

    Some(NumberToken {
        value,
        normalized,
        had_separator,
    })
}

fn canonicalize_separators(cleaned: &str) -> String {
    let comma_decimal = cleaned
        .rfind(',')
        .map(|pos| {
            let tail = &cleaned[pos + 1..];
            tail.len() == 2 && tail.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false);

    if comma_decimal {
        let pos = cleaned.rfind(',').unwrap_or(cleaned.len());
        let int_part: String = cleaned[..pos]
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let int_part = if int_part.is_empty() { "0".to_string() } else { int_part };
        return format!("{}.{}", int_part, &cleaned[pos + 1..]);
    }

    let without_commas: String = cleaned.chars().filter(|c| *c != ',').collect();
    let periods = without_commas.matches('.').count();
    if periods <= 1 {
        return without_commas;
    }

    // Several periods: keep the last one only if it looks like cents
    let pos = without_commas.rfind('.').unwrap_or(0);
    let tail = &without_commas[pos + 1..];
    let digits_before: String = without_commas[..pos]
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if tail.len() == 2 {
        format!("{}.{}", digits_before, tail)
    } else {
        without_commas.chars().filter(|c| c.is_ascii_digit()).collect()
    }
}

/// Parse a monetary token, reading separator-less tokens of three or more
/// digits as cents (`2825` is `28.25`)
pub fn normalize_number_token(token: &str) -> Option<Decimal> {
    let parsed = parse_number_token(token)?;
    if !parsed.had_separator && parsed.normalized.len() >= 3 {
        Some(parsed.value / Decimal::ONE_HUNDRED)
    } else {
        Some(parsed.value)
    }
}

/// Expand a two-digit year relative to `current_year`
///
/// Years more than one past the current two-digit year fall in the previous
/// century.
pub fn expand_two_digit_year(yy: u32, current_year: i32) -> i32 {
    let current_yy = current_year.rem_euclid(100) as u32;
    let century = current_year - current_year.rem_euclid(100);
    if yy > current_yy + 1 {
        century - 100 + yy as i32
    } else {
        century + yy as i32
    }
}

fn valid_date(year: i32, month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if year < MIN_YEAR || year > today.year() + 1 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse `DD/MM/YYYY`, `YYYY-MM-DD`, `DD.MM.YY` and friends
///
/// Day-first is assumed unless the middle group cannot be a month while the
/// first can, in which case the token is read month-first.
pub fn parse_numeric_date_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let repaired = repair_confusables(token.trim());
    let groups: Vec<&str> = repaired.split(['-', '/', '.']).collect();
    if groups.len() != 3
        || groups
            .iter()
            .any(|g| g.is_empty() || g.len() > 4 || !g.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let nums: Vec<u32> = groups.iter().filter_map(|g| g.parse().ok()).collect();
    if nums.len() != 3 {
        return None;
    }

    if groups[0].len() == 4 {
        return valid_date(nums[0] as i32, nums[1], nums[2], today);
    }

    let year = match groups[2].len() {
        4 => nums[2] as i32,
        1 | 2 => expand_two_digit_year(nums[2], today.year()),
        _ => return None,
    };

    let (mut day, mut month) = (nums[0], nums[1]);
    if month > 12 && day <= 12 {
        std::mem::swap(&mut day, &mut month);
    }
    valid_date(year, month, day, today)
}

/// Look up a month by full name or abbreviation
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    MONTHS
        .iter()
        .find(|(month, _)| *month == lower)
        .map(|(_, number)| *number)
}

fn strip_ordinal(token: &str) -> &str {
    let lower = token.to_ascii_lowercase();
    for suffix in ["st", "nd", "rd", "th"] {
        if lower.ends_with(suffix) && token.len() > suffix.len() {
            let head = &token[..token.len() - suffix.len()];
            if head.chars().all(|c| c.is_ascii_digit()) {
                return head;
            }
        }
    }
    token
}

/// Parse dates written with a month name: `15 Mar 2024`, `March 15th, 24`
///
/// A year is required; the first one- or two-digit number is the day.
pub fn parse_textual_date_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '/' | '.'))
        .filter(|p| !p.is_empty())
        .collect();

    let month_idx = parts.iter().position(|p| month_from_name(p).is_some())?;
    let month = month_from_name(parts[month_idx])?;

    let numbers: Vec<&str> = parts
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != month_idx)
        .map(|(_, p)| strip_ordinal(p))
        .filter(|p| !p.is_empty() && p.len() <= 4 && p.chars().all(|c| c.is_ascii_digit()))
        .collect();

    let four_digit = numbers.iter().find(|n| n.len() == 4);
    let short: Vec<&&str> = numbers.iter().filter(|n| n.len() <= 2).collect();

    let (day, year) = match (four_digit, short.as_slice()) {
        (Some(year), [day, ..]) => (day.parse().ok()?, year.parse().ok()?),
        (None, [day, year, ..]) => {
            let yy: u32 = year.parse().ok()?;
            (day.parse().ok()?, expand_two_digit_year(yy, today.year()))
        }
        _ => return None,
    };

    valid_date(year, month, day, today)
}

/// Try numeric first, then textual parsing
pub fn parse_date_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    parse_numeric_date_token(token, today).or_else(|| parse_textual_date_token(token, today))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_repair_only_in_numeric_tokens() {
        assert_eq!(repair_confusables("TOTAL 1O.5O"), "TOTAL 10.50");
        assert_eq!(repair_confusables("TOTAL:"), "TOTAL:");
        assert_eq!(repair_confusables("Sold to Oscar"), "Sold to Oscar");
        assert_eq!(repair_confusables("Rs.1OO"), "Rs.100");
        assert_eq!(repair_confusables("O1/O3/2024"), "01/03/2024");
        assert_eq!(repair_confusables("l2,5O"), "12,50");
    }

    #[test]
    fn test_repair_keeps_whitespace_layout() {
        assert_eq!(repair_confusables("  a\tb  "), "  a\tb  ");
    }

    #[test]
    fn test_separator_rules() {
        assert_eq!(parse_number_token("1,234.56").unwrap().value, dec("1234.56"));
        assert_eq!(parse_number_token("1.234,56").unwrap().value, dec("1234.56"));
        assert_eq!(parse_number_token("12,50").unwrap().value, dec("12.50"));
        assert_eq!(parse_number_token("1,250").unwrap().value, dec("1250"));
        assert_eq!(parse_number_token("1.234.567").unwrap().value, dec("1234567"));
        assert_eq!(parse_number_token("$ 45.00").unwrap().value, dec("45.00"));
        assert!(parse_number_token("abc").is_none());
        assert!(parse_number_token("...").is_none());
    }

    #[test]
    fn test_cents_heuristic() {
        assert_eq!(normalize_number_token("2825"), Some(dec("28.25")));
        assert_eq!(normalize_number_token("99"), Some(dec("99")));
        assert_eq!(normalize_number_token("28.25"), Some(dec("28.25")));
        assert_eq!(parse_number_token("2825").unwrap().value, dec("2825"));
    }

    #[test]
    fn test_two_digit_year_rollover() {
        assert_eq!(expand_two_digit_year(24, 2026), 2024);
        assert_eq!(expand_two_digit_year(27, 2026), 2027);
        assert_eq!(expand_two_digit_year(28, 2026), 1928);
        assert_eq!(expand_two_digit_year(99, 2026), 1999);
        assert_eq!(expand_two_digit_year(0, 2099), 2000);
    }

    #[test]
    fn test_numeric_dates() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(parse_numeric_date_token("15/03/2024", today()), d(2024, 3, 15));
        assert_eq!(parse_numeric_date_token("15-03-24", today()), d(2024, 3, 15));
        assert_eq!(parse_numeric_date_token("2024.03.15", today()), d(2024, 3, 15));
        assert_eq!(parse_numeric_date_token("03/15/2024", today()), d(2024, 3, 15));
        assert_eq!(parse_numeric_date_token("31/02/2024", today()), None);
        assert_eq!(parse_numeric_date_token("15/03/1969", today()), None);
        assert_eq!(parse_numeric_date_token("15/03/2028", today()), None);
        assert_eq!(parse_numeric_date_token("1234", today()), None);
    }

    #[test]
    fn test_textual_dates() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(parse_textual_date_token("15 Mar 2024", today()), d(2024, 3, 15));
        assert_eq!(parse_textual_date_token("March 15, 2024", today()), d(2024, 3, 15));
        assert_eq!(parse_textual_date_token("1st Sept 25", today()), d(2025, 9, 1));
        assert_eq!(parse_textual_date_token("22nd-Dec-2023", today()), d(2023, 12, 22));
        assert_eq!(parse_textual_date_token("March 15", today()), None);
        assert_eq!(parse_textual_date_token("Total 15 2024", today()), None);
    }

    #[test]
    fn test_month_lookup() {
        assert_eq!(month_from_name("Sept"), Some(9));
        assert_eq!(month_from_name("AUG."), Some(8));
        assert_eq!(month_from_name("may"), Some(5));
        assert_eq!(month_from_name("mayo"), None);
    }
}
