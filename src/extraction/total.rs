//! Total amount extraction
//!
//! Order of precedence:
//! 1. the latest line carrying a total label
//! 2. the best-scoring candidate, checked against subtotal + taxes
//! 3. subtotal + taxes alone

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::lines::{
    find_numbers, has_fraction, last_money, last_number, to_f64, NumberMatch, SUBTOTAL,
    TAX_KEYWORD, TOTAL_KEYWORD,
};
use super::{AmountCandidate, ExtractionConfig, TotalExtractionResult, TotalReason};

/// Label phrases, most specific first
const TOTAL_LABELS: [&str; 10] = [
    "grand total",
    "total payable",
    "amount payable",
    "amount due",
    "net amount",
    "net payable",
    "total amount",
    "balance due",
    "balance",
    "total",
];

lazy_static! {
    static ref LABEL_PATTERNS: Vec<(&'static str, Regex)> = TOTAL_LABELS
        .iter()
        .map(|label| {
            let pattern = format!(r"(?i)\b{}\b", label.replace(' ', r"\s*"));
            (*label, Regex::new(&pattern).expect("total label regex should compile"))
        })
        .collect();

    // "Total" that counts something other than money owed
    static ref NOT_A_TOTAL: Regex = Regex::new(
        r"(?i)\btotal\s*(?:qty|quantity|items?|tax|gst|cgst|sgst|vat|discount|savings?|saved)\b|\bqty\b|\bno\.?\s*of\s*items\b"
    )
    .expect("NOT_A_TOTAL regex should compile");

    static ref INVOICE: Regex = Regex::new(r"(?i)\binvoice\b").expect("INVOICE regex should compile");
}

/// Subtotal and taxes found on the receipt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub subtotal: Option<Decimal>,
    pub taxes: Vec<Decimal>,
    /// `subtotal + sum(taxes)` when a subtotal exists and the sum is representable
    pub expected_net: Option<Decimal>,
}

/// Everything the total extractor produced
#[derive(Debug, Clone, PartialEq)]
pub struct TotalAnalysis {
    pub total: Option<TotalExtractionResult>,
    pub candidates: Vec<AmountCandidate>,
    pub reconciliation: Reconciliation,
}

/// Which total label a line carries, if any
pub fn label_on_line(line: &str) -> Option<&'static str> {
    if SUBTOTAL.is_match(line) {
        return None;
    }
    LABEL_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(line))
        .map(|(label, _)| *label)
        .find(|label| *label != "total" || !NOT_A_TOTAL.is_match(line))
}

fn labelled_value(lines: &[String], index: usize) -> Option<NumberMatch> {
    last_money(&lines[index])
        .or_else(|| lines.get(index + 1).and_then(|next| last_money(next)))
        .or_else(|| last_number(&lines[index]))
}

/// Latest labelled total in the document
pub fn find_labelled_total(lines: &[String]) -> Option<(usize, &'static str, NumberMatch)> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let label = label_on_line(line)?;
            let value = labelled_value(lines, i)?;
            Some((i, label, value))
        })
        .last()
}

/// Locate the subtotal and sum the tax lines
///
/// A tax written without a separator and worth 100 or more is read as cents.
pub fn reconcile(lines: &[String]) -> Reconciliation {
    let subtotal = lines
        .iter()
        .position(|line| SUBTOTAL.is_match(line))
        .and_then(|i| {
            last_number(&lines[i]).or_else(|| lines.get(i + 1).and_then(|next| last_number(next)))
        })
        .map(|m| m.value);

    let taxes: Vec<Decimal> = lines
        .iter()
        .filter(|line| {
            TAX_KEYWORD.is_match(line)
                && !line.to_lowercase().contains("total")
                && !INVOICE.is_match(line)
        })
        .filter_map(|line| last_number(line))
        .map(|m| {
            if !m.had_separator && m.value >= Decimal::ONE_HUNDRED {
                m.value / Decimal::ONE_HUNDRED
            } else {
                m.value
            }
        })
        .collect();

    let expected_net = subtotal.and_then(|s| {
        taxes
            .iter()
            .try_fold(s, |acc, tax| acc.checked_add(*tax))
    });

    Reconciliation {
        subtotal,
        taxes,
        expected_net,
    }
}

fn is_keyword_line(line: &str) -> bool {
    TOTAL_KEYWORD.is_match(line) && !SUBTOTAL.is_match(line) && !TAX_KEYWORD.is_match(line)
}

/// Score every plausible total in the text
///
/// Numbers come from keyword lines, or from every line when no keyword
/// line carries one.
pub fn rank_candidates(
    lines: &[String],
    expected_net: Option<Decimal>,
    config: &ExtractionConfig,
) -> Vec<AmountCandidate> {
    let collect = |keyword_only: bool| -> Vec<(usize, bool, NumberMatch)> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !keyword_only || is_keyword_line(line))
            .flat_map(|(i, line)| {
                let keyword = is_keyword_line(line);
                find_numbers(line).into_iter().map(move |m| (i, keyword, m))
            })
            .collect()
    };

    let mut found = collect(true);
    if found.is_empty() {
        found = collect(false);
    }

    let recent_from = lines.len().saturating_sub(config.recent_lines_window);
    found
        .into_iter()
        .map(|(i, keyword, m)| {
            let mut score = 100.0 - i as f64;
            if has_fraction(m.value) {
                score += 10.0;
            }
            if let Some(expected) = expected_net {
                score += (50.0 - to_f64(distance(m.value, expected))).max(0.0);
            }
            if i >= recent_from {
                score += 10.0;
            }
            AmountCandidate {
                value: m.value,
                raw_token: m.raw,
                normalized_token: m.normalized,
                line_index: Some(i),
                has_keyword: keyword,
                score,
            }
        })
        .collect()
}

/// Highest score; the earliest candidate wins ties
pub fn best_candidate(candidates: &[AmountCandidate]) -> Option<&AmountCandidate> {
    candidates.iter().fold(None, |best, c| match best {
        Some(b) if b.score >= c.score => Some(b),
        _ => Some(c),
    })
}

/// `|a - b|`, saturating at `Decimal::MAX`
fn distance(a: Decimal, b: Decimal) -> Decimal {
    a.checked_sub(b).map(|d| d.abs()).unwrap_or(Decimal::MAX)
}

/// Allowed distance between a candidate and the expected net
pub fn tolerance(expected_net: Decimal) -> Decimal {
    expected_net
        .checked_mul(Decimal::new(5, 2))
        .unwrap_or(Decimal::MAX)
        .max(Decimal::from(2))
}

fn strip_repeated_leading_digit(normalized: &str) -> Option<Decimal> {
    let mut chars = normalized.chars();
    let first = chars.next()?;
    let second = chars.next()?;
    if first.is_ascii_digit() && first == second {
        normalized[1..].parse().ok()
    } else {
        None
    }
}

/// Every placement of the decimal point within the value's cents digits
fn decimal_shifts(value: Decimal) -> Vec<Decimal> {
    let Some(cents) = value.round_dp(2).checked_mul(Decimal::ONE_HUNDRED) else {
        return Vec::new();
    };
    let cents: String = cents
        .trunc()
        .normalize()
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    (1..cents.len())
        .filter_map(|k| format!("{}.{}", &cents[..k], &cents[k..]).parse().ok())
        .collect()
}

/// Try to turn a grossly wrong candidate into one near `expected_net`
///
/// Repairs: divide by 10, 100 or 1000; drop a doubled leading digit; move
/// the decimal point within the cents digits. The closest repair within
/// tolerance wins.
pub fn repair_candidate(candidate: &AmountCandidate, expected_net: Decimal) -> Option<Decimal> {
    let value = candidate.value;
    let tol = tolerance(expected_net);

    let mut options = vec![
        value / Decimal::TEN,
        value / Decimal::ONE_HUNDRED,
        value / Decimal::from(1000),
    ];
    options.extend(strip_repeated_leading_digit(&candidate.normalized_token));
    options.extend(decimal_shifts(value));

    options
        .into_iter()
        .filter(|repaired| distance(*repaired, expected_net) <= tol)
        .min_by_key(|repaired| distance(*repaired, expected_net))
}

/// Run the full total pipeline over pre-split lines
pub fn analyze_total(lines: &[String], config: &ExtractionConfig) -> TotalAnalysis {
    let reconciliation = reconcile(lines);
    let candidates = rank_candidates(lines, reconciliation.expected_net, config);

    let result = |value: Decimal, raw_token: String, reason: TotalReason| TotalExtractionResult {
        value,
        raw_token,
        reason,
        subtotal: reconciliation.subtotal,
        taxes: reconciliation.taxes.clone(),
    };

    let total = if let Some((line, label, m)) = find_labelled_total(lines) {
        debug!(line, label, value = %m.value, "Total taken from label");
        Some(result(m.value, m.raw, TotalReason::LabelPriorityLast))
    } else {
        match (best_candidate(&candidates), reconciliation.expected_net) {
            (Some(best), None) => Some(result(
                best.value,
                best.raw_token.clone(),
                TotalReason::RankedCandidate,
            )),
            (Some(best), Some(expected)) => {
                if distance(best.value, expected) <= tolerance(expected) {
                    Some(result(
                        best.value,
                        best.raw_token.clone(),
                        TotalReason::RankedCandidate,
                    ))
                } else if let Some(repaired) = repair_candidate(best, expected) {
                    debug!(
                        candidate = %best.value,
                        repaired = %repaired,
                        expected = %expected,
                        "Repaired total candidate"
                    );
                    Some(result(
                        repaired,
                        best.raw_token.clone(),
                        TotalReason::RepairedCandidateNearExpected,
                    ))
                } else {
                    debug!(candidate = %best.value, expected = %expected, "Discarded total candidate");
                    Some(result(
                        expected,
                        expected.to_string(),
                        TotalReason::ComputedFromSubtotalAndTaxes,
                    ))
                }
            }
            (None, Some(expected)) => Some(result(
                expected,
                expected.to_string(),
                TotalReason::ComputedFromSubtotalAndTaxes,
            )),
            (None, None) => None,
        }
    };

    TotalAnalysis {
        total,
        candidates,
        reconciliation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn lines(text: &str) -> Vec<String> {
        super::super::lines::split_lines(text)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_label_detection() {
        assert_eq!(label_on_line("GRAND TOTAL 10.00"), Some("grand total"));
        assert_eq!(label_on_line("Amount Due: 4.00"), Some("amount due"));
        assert_eq!(label_on_line("Sub Total 8.00"), None);
        assert_eq!(label_on_line("Subtotal 8.00"), None);
        assert_eq!(label_on_line("Total Qty 3"), None);
        assert_eq!(label_on_line("Total Tax 1.20"), None);
        assert_eq!(label_on_line("Total incl. VAT 12.00"), Some("total"));
    }

    #[test]
    fn test_latest_label_wins() {
        let text = "Total 5.00\nDiscount 1.00\nGrand Total 4.00";
        let analysis = analyze_total(&lines(text), &ExtractionConfig::default());
        let total = analysis.total.unwrap();
        assert_eq!(total.value, dec("4.00"));
        assert_eq!(total.reason, TotalReason::LabelPriorityLast);
    }

    #[test]
    fn test_label_value_on_next_line() {
        let text = "TOTAL\n12.40\nThank you";
        let total = analyze_total(&lines(text), &ExtractionConfig::default())
            .total
            .unwrap();
        assert_eq!(total.value, dec("12.40"));
        assert_eq!(total.raw_token, "12.40");
    }

    #[test]
    fn test_tax_cents_rescale() {
        let rec = reconcile(&lines("Subtotal 10.00\nVAT 150"));
        assert_eq!(rec.taxes, vec![dec("1.50")]);
        assert_eq!(rec.expected_net, Some(dec("11.50")));
    }

    #[test]
    fn test_repairs() {
        let candidate = AmountCandidate {
            value: dec("2200.00"),
            raw_token: "2200.00".to_string(),
            normalized_token: "2200.00".to_string(),
            line_index: Some(2),
            has_keyword: true,
            score: 0.0,
        };
        assert_eq!(repair_candidate(&candidate, dec("200.00")), Some(dec("200.00")));
        assert_eq!(repair_candidate(&candidate, dec("22.00")), Some(dec("22.00")));
        assert_eq!(repair_candidate(&candidate, dec("7.00")), None);
        assert_eq!(tolerance(dec("10")), dec("2"));
        assert_eq!(tolerance(dec("1000")), dec("50"));
    }

    #[test]
    fn test_decimal_point_shift_repair() {
        // Neither a division nor a doubled leading digit reaches 12.30
        let candidate = AmountCandidate {
            value: dec("1.23"),
            raw_token: "1.23".to_string(),
            normalized_token: "1.23".to_string(),
            line_index: Some(2),
            has_keyword: true,
            score: 0.0,
        };
        assert_eq!(repair_candidate(&candidate, dec("12.30")), Some(dec("12.3")));
        assert_eq!(decimal_shifts(dec("1.23")), vec![dec("1.23"), dec("12.3")]);
    }

    #[test]
    fn test_recent_lines_get_bonus() {
        let text = "Item 1\nItem 2\nItem 3\nItem 4\nItem 5";
        let candidates = rank_candidates(&lines(text), None, &ExtractionConfig::default());
        let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![100.0, 99.0, 108.0, 107.0, 106.0]);
        assert_eq!(best_candidate(&candidates).unwrap().value, dec("3"));
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        let config = ExtractionConfig::default();

        let text = "Subtotal 10.00\nTax 1.00\nNet 9999999999999999999999999999";
        let total = analyze_total(&lines(text), &config).total.unwrap();
        assert_eq!(total.value, dec("11.00"));
        assert_eq!(total.reason, TotalReason::ComputedFromSubtotalAndTaxes);

        let text = "Subtotal 79228162514264337593543950335\nTax 79228162514264337593543950335.00";
        let analysis = analyze_total(&lines(text), &config);
        assert_eq!(analysis.reconciliation.expected_net, None);
        assert_eq!(analysis.total.unwrap().reason, TotalReason::RankedCandidate);

        assert!(decimal_shifts(Decimal::MAX).is_empty());
        assert_eq!(tolerance(Decimal::MAX), Decimal::MAX * Decimal::new(5, 2));
    }

    #[test]
    fn test_best_candidate_tie_prefers_first() {
        let make = |value: &str, score: f64| AmountCandidate {
            value: dec(value),
            raw_token: value.to_string(),
            normalized_token: value.to_string(),
            line_index: None,
            has_keyword: false,
            score,
        };
        let candidates = vec![make("1.00", 5.0), make("2.00", 5.0), make("3.00", 4.0)];
        assert_eq!(best_candidate(&candidates).unwrap().value, dec("1.00"));
    }
}
