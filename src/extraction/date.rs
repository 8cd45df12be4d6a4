//! Transaction date extraction
//!
//! Labelled dates (`Date: 15/03/2024`) win outright. Without a label the
//! header area is scanned and each date is scored by position, closeness to
//! a header keyword and whether it only appeared after confusable repair.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use super::{DateCandidate, DateReason, ExtractionConfig};
use crate::normalize::{parse_numeric_date_token, parse_textual_date_token, repair_confusables};

lazy_static! {
    static ref DATE_LABEL: Regex = Regex::new(
        r"(?i)\b(?:invoice\s*date|bill\s*date|txn\s*date|transaction\s*date|dated|date|dt)\b\s*[:.\-]?\s*(?P<rest>.*)$"
    )
    .expect("DATE_LABEL regex should compile");

    static ref NUMERIC_DATE: Regex = Regex::new(r"\b\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}\b")
        .expect("NUMERIC_DATE regex should compile");

    static ref TEXTUAL_DATE: Regex = Regex::new(
        r"(?i)\b(?:\d{1,2}(?:st|nd|rd|th)?[\s\-/.,]*(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s\-/.,]*\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s\-/.,]*\d{1,2}(?:st|nd|rd|th)?[\s\-/.,]+\d{2,4})\b"
    )
    .expect("TEXTUAL_DATE regex should compile");

    static ref HEADER_KEYWORD: Regex =
        Regex::new(r"(?i)\b(?:receipt|invoice|terminal|txn|transaction)\b")
            .expect("HEADER_KEYWORD regex should compile");
}

/// Every parseable date in `text`, in order of appearance
pub fn dates_in(text: &str, today: NaiveDate) -> Vec<(String, NaiveDate)> {
    let mut found: Vec<(usize, String, NaiveDate)> = NUMERIC_DATE
        .find_iter(text)
        .filter_map(|m| {
            parse_numeric_date_token(m.as_str(), today).map(|d| (m.start(), m.as_str().to_string(), d))
        })
        .collect();

    found.extend(TEXTUAL_DATE.find_iter(text).filter_map(|m| {
        parse_textual_date_token(m.as_str(), today).map(|d| (m.start(), m.as_str().to_string(), d))
    }));

    found.sort_by_key(|(start, _, _)| *start);
    found.into_iter().map(|(_, raw, date)| (raw, date)).collect()
}

/// Dates on a line, retrying after confusable repair
///
/// The flag is true when only the repaired text yielded a date.
fn dates_on_line(line: &str, today: NaiveDate) -> (Vec<(String, NaiveDate)>, bool) {
    let direct = dates_in(line, today);
    if !direct.is_empty() {
        return (direct, false);
    }
    let repaired = repair_confusables(line);
    if repaired == line {
        return (Vec::new(), false);
    }
    let found = dates_in(&repaired, today);
    let needed_repair = !found.is_empty();
    (found, needed_repair)
}

/// First date that follows a date label, on the label line or the next one
pub fn find_labelled_date(lines: &[String], today: NaiveDate) -> Option<DateCandidate> {
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = DATE_LABEL.captures(line) else {
            continue;
        };
        let rest = caps.name("rest").map_or("", |m| m.as_str());

        let (mut found, _) = dates_on_line(rest, today);
        if found.is_empty() && rest.trim().is_empty() {
            if let Some(next) = lines.get(i + 1) {
                found = dates_on_line(next, today).0;
            }
        }

        if let Some((raw, date)) = found.into_iter().next() {
            return Some(DateCandidate {
                date,
                raw_token: raw,
                reason: DateReason::Label,
                score: 100.0,
            });
        }
    }
    None
}

/// Score every date found in the header lines
pub fn scan_header_dates(
    lines: &[String],
    today: NaiveDate,
    config: &ExtractionConfig,
) -> Vec<DateCandidate> {
    let header: Vec<&String> = lines.iter().take(config.header_scan_lines).collect();
    let keyword_lines: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, line)| HEADER_KEYWORD.is_match(line))
        .map(|(i, _)| i)
        .collect();

    let mut candidates = Vec::new();
    for (i, line) in header.iter().enumerate() {
        let (found, needed_repair) = dates_on_line(line, today);
        if found.is_empty() {
            continue;
        }

        let mut score = (100.0 - 2.0 * i as f64).max(0.0);
        if let Some(distance) = keyword_lines.iter().map(|k| k.abs_diff(i)).min() {
            score += (40.0 - 10.0 * distance as f64).max(0.0);
        }
        if needed_repair {
            score += 8.0;
        }

        candidates.extend(found.into_iter().map(|(raw, date)| DateCandidate {
            date,
            raw_token: raw,
            reason: DateReason::HeaderScan,
            score,
        }));
    }
    candidates
}

/// Best date in the text, or `None` when nothing parses
pub fn extract_date(
    lines: &[String],
    today: NaiveDate,
    config: &ExtractionConfig,
) -> Option<DateCandidate> {
    if let Some(labelled) = find_labelled_date(lines, today) {
        return Some(labelled);
    }

    // Strictly greater, so ties keep the earlier line
    scan_header_dates(lines, today, config)
        .into_iter()
        .fold(None, |best: Option<DateCandidate>, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
}
