//! Amount candidates from word-level OCR output
//!
//! Words are grouped into visual lines by the vertical midpoint of their
//! boxes, then every number is scored by keyword, position, recognition
//! confidence and magnitude.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::lines::{find_numbers, to_f64, NumberMatch, SUBTOTAL, TOTAL_KEYWORD};
use super::{AmountCandidate, ExtractionConfig};
use crate::engine::Word;
use crate::normalize::month_from_name;

const KEYWORD_BONUS: f64 = 45.0;
const RECENCY_MAX: f64 = 24.0;
const CONFIDENCE_MAX: f64 = 25.0;
const MAGNITUDE_MAX: f64 = 25.0;

lazy_static! {
    static ref DATE_CONTEXT: Regex =
        Regex::new(r"(?i)\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}|\b(?:year|yr|date|dated)\b")
            .expect("DATE_CONTEXT regex should compile");
}

/// Words sharing a baseline
#[derive(Debug, Clone, PartialEq)]
pub struct VisualLine {
    pub words: Vec<Word>,
    /// Running mean of word midpoints
    pub mid_y: f32,
}

impl VisualLine {
    fn new(word: Word) -> Self {
        Self {
            mid_y: word.bbox.mid_y(),
            words: vec![word],
        }
    }

    fn push(&mut self, word: Word) {
        let n = self.words.len() as f32;
        self.mid_y = (self.mid_y * n + word.bbox.mid_y()) / (n + 1.0);
        self.words.push(word);
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Mean of known word confidences
    pub fn confidence(&self) -> Option<f32> {
        let known: Vec<f32> = self.words.iter().filter_map(|w| w.confidence).collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f32>() / known.len() as f32)
        }
    }
}

/// Group words into lines in reading order
///
/// A word joins the current line when its midpoint is within `tolerance_px`
/// of the line's running midpoint; otherwise it starts a new line.
pub fn cluster_lines(words: &[Word], tolerance_px: f32) -> Vec<VisualLine> {
    let mut lines: Vec<VisualLine> = Vec::new();
    for word in words.iter().filter(|w| !w.text.trim().is_empty()) {
        match lines.last_mut() {
            Some(line) if (word.bbox.mid_y() - line.mid_y).abs() <= tolerance_px => {
                line.push(word.clone())
            }
            _ => lines.push(VisualLine::new(word.clone())),
        }
    }
    lines
}

/// Bare 6 to 12 digit integers are barcodes and invoice numbers; grouped
/// integers such as `1,234,567` are amounts
fn looks_like_identifier(m: &NumberMatch) -> bool {
    !m.had_separator && (6..=12).contains(&m.normalized.len())
}

fn has_date_context(line: &str) -> bool {
    DATE_CONTEXT.is_match(line)
        || line
            .split(|c: char| !c.is_alphabetic())
            .any(|word| word.len() >= 3 && month_from_name(word).is_some())
}

fn looks_like_year(normalized: &str, line: &str) -> bool {
    normalized.len() == 4
        && normalized
            .parse::<u32>()
            .map(|year| (1970..=2100).contains(&year))
            .unwrap_or(false)
        && has_date_context(line)
}

/// Score a candidate found on line `index` of `line_count`
pub fn score_candidate(
    value: f64,
    has_keyword: bool,
    index: usize,
    line_count: usize,
    confidence: Option<f32>,
) -> f64 {
    let mut score = 0.0;
    if has_keyword {
        score += KEYWORD_BONUS;
    }
    if line_count > 0 {
        score += RECENCY_MAX * (index + 1) as f64 / line_count as f64;
    }
    if let Some(conf) = confidence {
        score += CONFIDENCE_MAX * (conf as f64).clamp(0.0, 100.0) / 100.0;
    }
    score += (6.0 * (value.max(0.0) + 1.0).log10()).min(MAGNITUDE_MAX);
    score
}

/// Ranked amount candidates from word boxes, best first
pub fn extract_bbox_candidates(words: &[Word], config: &ExtractionConfig) -> Vec<AmountCandidate> {
    let lines = cluster_lines(words, config.line_merge_tolerance_px);
    let line_count = lines.len();
    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let mut candidates = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let text = line.text();
        let has_keyword = TOTAL_KEYWORD.is_match(&text) && !SUBTOTAL.is_match(&text);

        let from_words = line.words.iter().flat_map(|word| {
            find_numbers(&word.text)
                .into_iter()
                .map(move |m| (m, word.confidence))
        });
        let from_line = find_numbers(&text)
            .into_iter()
            .map(|m| (m, line.confidence()));

        for (m, confidence) in from_words.chain(from_line).collect::<Vec<_>>() {
            if looks_like_identifier(&m) || looks_like_year(&m.normalized, &text) {
                continue;
            }
            if !seen.insert((index, m.normalized.clone())) {
                continue;
            }

            let score = score_candidate(to_f64(m.value), has_keyword, index, line_count, confidence);
            candidates.push(AmountCandidate {
                value: m.value,
                raw_token: m.raw,
                normalized_token: m.normalized,
                line_index: Some(index),
                has_keyword,
                score,
            });
        }
    }

    rank_with_keyword_promotion(candidates, config.keyword_promotion_margin)
}

/// Sort by score, then lift the best keyword candidate to the top when it is
/// within `margin` of the leader
pub fn rank_with_keyword_promotion(
    mut candidates: Vec<AmountCandidate>,
    margin: f64,
) -> Vec<AmountCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let Some(top_score) = candidates.first().filter(|c| !c.has_keyword).map(|c| c.score) else {
        return candidates;
    };
    if let Some(pos) = candidates
        .iter()
        .position(|c| c.has_keyword && top_score - c.score <= margin)
    {
        let promoted = candidates.remove(pos);
        candidates.insert(0, promoted);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BBox;

    fn word(text: &str, y: f32) -> Word {
        Word {
            text: text.to_string(),
            bbox: BBox::new(0.0, y, 10.0, y + 10.0),
            confidence: Some(90.0),
        }
    }

    #[test]
    fn test_clustering_is_sequential() {
        let words = vec![
            word("ACME", 0.0),
            word("STORE", 3.0),
            word("TOTAL", 40.0),
            word("9.99", 45.0),
            word("late", 2.0),
        ];
        let lines = cluster_lines(&words, 8.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text(), "ACME STORE");
        assert_eq!(lines[1].text(), "TOTAL 9.99");
        assert_eq!(lines[2].text(), "late");
    }

    #[test]
    fn test_identifiers_and_years_filtered() {
        let words = vec![
            word("Invoice", 0.0),
            word("88231177", 0.0),
            word("Year", 20.0),
            word("2024", 20.0),
            word("Total", 40.0),
            word("12.50", 40.0),
        ];
        let candidates = extract_bbox_candidates(&words, &ExtractionConfig::default());
        let values: Vec<String> = candidates.iter().map(|c| c.normalized_token.clone()).collect();
        assert_eq!(values, vec!["12.50".to_string()]);
        assert!(candidates[0].has_keyword);
    }

    #[test]
    fn test_grouped_integers_are_amounts() {
        let words = vec![
            word("Total", 0.0),
            word("1,234,567", 0.0),
            word("Paid", 20.0),
            word("1,23,456", 20.0),
            word("Ref", 40.0),
            word("5512345", 40.0),
        ];
        let candidates = extract_bbox_candidates(&words, &ExtractionConfig::default());
        let mut values: Vec<String> = candidates.iter().map(|c| c.normalized_token.clone()).collect();
        values.sort();
        assert_eq!(values, vec!["123456".to_string(), "1234567".to_string()]);
    }

    #[test]
    fn test_keyword_promotion_within_margin() {
        let make = |value: i64, score: f64, has_keyword: bool| AmountCandidate {
            value: value.into(),
            raw_token: value.to_string(),
            normalized_token: value.to_string(),
            line_index: None,
            has_keyword,
            score,
        };
        let ranked = rank_with_keyword_promotion(
            vec![make(1, 50.0, false), make(2, 46.0, true), make(3, 47.0, false)],
            6.0,
        );
        assert_eq!(ranked[0].normalized_token, "2");

        let ranked = rank_with_keyword_promotion(vec![make(1, 60.0, false), make(2, 40.0, true)], 6.0);
        assert_eq!(ranked[0].normalized_token, "1");
    }

    #[test]
    fn test_score_components() {
        let score = score_candidate(0.0, true, 0, 1, Some(100.0));
        assert!((score - (45.0 + 24.0 + 25.0)).abs() < 1e-9);
        assert_eq!(score_candidate(1e9, false, 0, 0, None), 25.0);
    }
}
