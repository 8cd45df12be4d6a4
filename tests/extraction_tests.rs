//! # Extraction Tests
//!
//! End-to-end receipt parsing over realistic OCR text.

use std::str::FromStr;

use chrono::NaiveDate;
use receipt_ocr::engine::{BBox, Word};
use receipt_ocr::extraction::{DateReason, ExtractionConfig, TotalReason};
use receipt_ocr::ReceiptParser;
use rust_decimal::Decimal;

const GROCERY_RECEIPT: &str = "FRESH MART
123 Main Street
Date: 12/03/2024

Milk 2.50
Bread 3.75
TOTAL 28.25
Cash 30.00
Change 1.75";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn parser() -> ReceiptParser {
    ReceiptParser::new(ExtractionConfig::default()).with_reference_date(date(2026, 6, 1))
}

fn word(text: &str, x: f32, y: f32) -> Word {
    Word {
        text: text.to_string(),
        bbox: BBox::new(x, y, x + 40.0, y + 12.0),
        confidence: Some(90.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_total_and_date() {
        let receipt = parser().parse(GROCERY_RECEIPT, None);

        let total = receipt.total.unwrap();
        assert_eq!(total.value, dec("28.25"));
        assert_eq!(total.raw_token, "28.25");
        assert_eq!(total.reason, TotalReason::LabelPriorityLast);

        assert_eq!(receipt.date, date(2024, 3, 12));
        assert_eq!(receipt.date_raw.as_deref(), Some("12/03/2024"));
        assert_eq!(receipt.date_reason, DateReason::Label);
        assert_eq!(receipt.merchant, "FRESH MART");
        assert_eq!(receipt.line_count, 8);
    }

    #[test]
    fn test_text_candidates_come_from_keyword_lines() {
        let receipt = parser().parse(GROCERY_RECEIPT, None);
        assert_eq!(receipt.amount_candidates.len(), 1);
        assert_eq!(receipt.amount_candidates[0].value, dec("28.25"));
        assert!(receipt.amount_candidates[0].has_keyword);
        assert_eq!(receipt.amount_candidates[0].line_index, Some(5));
    }

    #[test]
    fn test_total_computed_from_subtotal_and_taxes() {
        let text = "ABC TRADERS\nSubtotal 100.00\nCGST 9.00\nSGST 9.00";
        let total = parser().extract_total(text).unwrap();

        assert_eq!(total.value, dec("118"));
        assert_eq!(total.reason, TotalReason::ComputedFromSubtotalAndTaxes);
        assert_eq!(total.subtotal, Some(dec("100.00")));
        assert_eq!(total.taxes, vec![dec("9.00"), dec("9.00")]);
    }

    #[test]
    fn test_inflated_candidate_repaired_toward_expected() {
        let text = "Subtotal 180.00\nGST 20.00\nNet 2200.00";
        let total = parser().extract_total(text).unwrap();

        assert_eq!(total.value, dec("200"));
        assert_eq!(total.raw_token, "2200.00");
        assert_eq!(total.reason, TotalReason::RepairedCandidateNearExpected);
    }

    #[test]
    fn test_misplaced_decimal_point_repaired() {
        let text = "Subtotal 10.00\nTax 2.30\nAmount 1.23";
        let total = parser().extract_total(text).unwrap();

        assert_eq!(total.value, dec("12.3"));
        assert_eq!(total.raw_token, "1.23");
        assert_eq!(total.reason, TotalReason::RepairedCandidateNearExpected);
    }

    #[test]
    fn test_oversized_numbers_do_not_panic() {
        let total = parser()
            .extract_total("Subtotal 10.00\nTax 1.00\nNet 9999999999999999999999999999")
            .unwrap();
        assert_eq!(total.value, dec("11.00"));

        let receipt = parser().parse(
            "Subtotal 79228162514264337593543950335\nTax 79228162514264337593543950335.00",
            None,
        );
        assert!(receipt.total.is_some());
    }

    #[test]
    fn test_candidate_consistent_with_taxes_is_kept() {
        let text = "Subtotal 50.00\nVAT 10.00\nAmount 60.00";
        let total = parser().extract_total(text).unwrap();
        assert_eq!(total.value, dec("60.00"));
        assert_eq!(total.reason, TotalReason::RankedCandidate);
    }

    #[test]
    fn test_confusable_total_is_read() {
        let total = parser().extract_total("CAFE LUNA\nTOTAL 2O.5O").unwrap();
        assert_eq!(total.value, dec("20.50"));
        assert_eq!(total.raw_token, "2O.5O");
    }

    #[test]
    fn test_no_numbers_means_no_total() {
        assert!(parser().extract_total("Thank you\nPlease come again").is_none());
    }

    #[test]
    fn test_header_scan_date() {
        let text = "ACME STORE\nReceipt #4521\n15 Mar 2024\nCoffee 3.50\nTOTAL 3.50";
        let receipt = parser().parse(text, None);

        assert_eq!(receipt.date, date(2024, 3, 15));
        assert_eq!(receipt.date_reason, DateReason::HeaderScan);
        assert_eq!(receipt.merchant, "ACME STORE");
    }

    #[test]
    fn test_header_scan_stops_after_twelve_lines() {
        let receipt_with_items = |items: usize| {
            let mut lines = vec!["CORNER SHOP".to_string()];
            lines.extend((1..=items).map(|n| format!("Item {n} 1.00")));
            lines.push("15 Mar 2024".to_string());
            lines.join("\n")
        };

        // Twelfth line is still part of the header
        let found = parser().extract_date(&receipt_with_items(10)).unwrap();
        assert_eq!(found.date, date(2024, 3, 15));
        assert_eq!(found.reason, DateReason::HeaderScan);

        // Thirteenth line is not
        assert!(parser().extract_date(&receipt_with_items(11)).is_none());
        let receipt = parser().parse(&receipt_with_items(11), None);
        assert_eq!(receipt.date, date(2026, 6, 1));
        assert_eq!(receipt.date_reason, DateReason::Fallback);
    }

    #[test]
    fn test_month_first_date_on_label() {
        let found = parser().extract_date("Txn Date 03/15/2024").unwrap();
        assert_eq!(found.date, date(2024, 3, 15));
        assert_eq!(found.iso(), "2024-03-15");
        assert_eq!(found.reason, DateReason::Label);
    }

    #[test]
    fn test_date_falls_back_to_reference() {
        let receipt = parser().parse("QUICK STOP\nTOTAL 5.00", None);
        assert_eq!(receipt.date, date(2026, 6, 1));
        assert_eq!(receipt.date_raw, None);
        assert_eq!(receipt.date_reason, DateReason::Fallback);
    }

    #[test]
    fn test_parsing_is_repeatable() {
        let p = parser();
        let first = p.parse(GROCERY_RECEIPT, None);
        let second = p.parse(GROCERY_RECEIPT, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_word_boxes_drive_candidates() {
        let words = vec![
            word("SHOP", 0.0, 0.0),
            word("Invoice", 0.0, 20.0),
            word("100234567", 50.0, 21.0),
            word("Milk", 0.0, 40.0),
            word("3.25", 50.0, 40.0),
            word("TOTAL", 0.0, 60.0),
            word("28.25", 50.0, 61.0),
        ];
        let text = "SHOP\nInvoice 100234567\nMilk 3.25\nTOTAL 28.25";
        let receipt = parser().parse(text, Some(&words));

        let top = &receipt.amount_candidates[0];
        assert_eq!(top.value, dec("28.25"));
        assert!(top.has_keyword);
        assert_eq!(top.line_index, Some(3));
        assert!(receipt
            .amount_candidates
            .iter()
            .all(|c| c.normalized_token != "100234567"));
        assert_eq!(receipt.amount_candidates.len(), 2);

        // The total itself still comes from the text
        assert_eq!(receipt.total.unwrap().value, dec("28.25"));
    }

    #[test]
    fn test_empty_words_use_text_candidates() {
        let words: Vec<Word> = Vec::new();
        let receipt = parser().parse(GROCERY_RECEIPT, Some(&words));
        assert_eq!(receipt.amount_candidates.len(), 1);
        assert_eq!(receipt.amount_candidates[0].value, dec("28.25"));
    }

    #[test]
    fn test_parsed_receipt_serializes() {
        let receipt = parser().parse(GROCERY_RECEIPT, None);
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["merchant"], "FRESH MART");
        assert_eq!(json["date"], "2024-03-12");
    }
}
