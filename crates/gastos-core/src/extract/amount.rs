//! Total amount extraction
//!
//! Keyword phrases are tried by priority tier. The first valid match in the
//! highest tier that matches anything wins; tiers are never mixed. Without any
//! keyword match, the largest money-like token is taken at low confidence.

use regex::Regex;
use tracing::debug;

use crate::models::{round_cents, FieldValue};

/// A money token: `29,86`, `29.86`, `1.234,56`, `1,234.56`
const MONEY: &str = r"(\d{1,3}(?:[.,]\d{3})+[.,]\d{2}|\d+[.,]\d{2})\b";

/// Most non-digit characters allowed between a keyword and its number
const MAX_GAP: usize = 40;

/// Confidence of the largest-number fallback
const FALLBACK_CONFIDENCE: i32 = 40;

/// Plausible receipt totals, exclusive on both ends
const MIN_AMOUNT: f64 = 0.0;
const MAX_AMOUNT: f64 = 10_000.0;

struct AmountPattern {
    regex: Regex,
    confidence: i32,
}

impl AmountPattern {
    fn new(pattern: &str, confidence: i32) -> Self {
        Self {
            regex: Regex::new(pattern).expect("valid regex"),
            confidence,
        }
    }

    /// Keyword, then up to `MAX_GAP` non-digits, then the amount
    fn keyword(keyword: &str, confidence: i32) -> Self {
        Self::new(
            &format!(r"(?i)\b{}[^\d]{{0,{}}}?{}", keyword, MAX_GAP, MONEY),
            confidence,
        )
    }

    /// Amount followed by a currency marker
    fn suffix(suffix: &str, confidence: i32) -> Self {
        Self::new(&format!(r"(?i)\b{}\s*{}", MONEY, suffix), confidence)
    }
}

pub struct AmountExtractor {
    tiers: Vec<Vec<AmountPattern>>,
    money: Regex,
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AmountExtractor {
    pub fn new() -> Self {
        let tiers = vec![
            // Card amount / amount paid / total to pay
            vec![
                AmountPattern::keyword(r"IMPORTE\s*TARJETA", 95),
                AmountPattern::keyword(r"IMPORTE\s*PAGADO", 95),
                AmountPattern::keyword(r"TOTAL\s*A\s*PAGAR", 90),
                AmountPattern::new(
                    &format!(r"(?i)\bA\s*PAGAR[^\d]{{0,{}}}?{}\s*(?:EUR|€)", MAX_GAP, MONEY),
                    90,
                ),
            ],
            // Purchase total / amount in euros / bare total / bare amount
            vec![
                AmountPattern::keyword(r"TOTAL\s*(?:DE\s*)?COMPRA", 80),
                AmountPattern::suffix(r"(?:EUR|€)", 75),
                AmountPattern::keyword(r"TOTAL", 70),
                AmountPattern::keyword(r"IMPORTE", 60),
            ],
        ];

        Self {
            tiers,
            money: Regex::new(&format!(r"\b{}", MONEY)).expect("valid regex"),
        }
    }

    /// Extract the receipt total from OCR text
    pub fn extract(&self, text: &str) -> FieldValue<f64> {
        for (tier, patterns) in self.tiers.iter().enumerate() {
            for pattern in patterns {
                let found = pattern
                    .regex
                    .captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .filter_map(|m| parse_amount(m.as_str()))
                    .find(|amount| is_plausible(*amount));
                if let Some(amount) = found {
                    debug!(tier, amount, confidence = pattern.confidence, "Amount found");
                    return FieldValue::new(round_cents(amount), pattern.confidence);
                }
            }
        }

        let largest = self
            .money
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| parse_amount(m.as_str()))
            .filter(|amount| is_plausible(*amount))
            .max_by(|a, b| a.total_cmp(b));

        match largest {
            Some(amount) => {
                debug!(amount, "Amount found (largest number fallback)");
                FieldValue::new(round_cents(amount), FALLBACK_CONFIDENCE)
            }
            None => FieldValue::amount_not_found(),
        }
    }
}

fn is_plausible(amount: f64) -> bool {
    amount > MIN_AMOUNT && amount < MAX_AMOUNT
}

/// Parse a money token in either decimal convention
///
/// The last `.` or `,` followed by exactly two digits is the decimal mark;
/// any other separator is a thousands separator.
pub fn parse_amount(token: &str) -> Option<f64> {
    let token = token.trim();
    let digits_only = |s: &str| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>();

    match token.rfind(['.', ',']) {
        Some(pos) if token.len() - pos - 1 == 2 => {
            let whole = digits_only(&token[..pos]);
            let cents = &token[pos + 1..];
            let whole = if whole.is_empty() { "0".to_string() } else { whole };
            format!("{}.{}", whole, cents).parse().ok()
        }
        _ => {
            let whole = digits_only(token);
            if whole.is_empty() {
                None
            } else {
                whole.parse().ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_conventions() {
        assert_eq!(parse_amount("29,86"), Some(29.86));
        assert_eq!(parse_amount("29.86"), Some(29.86));
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("1.234"), Some(1234.0));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_card_amount_beats_unrelated_numbers() {
        let text = "MERCADONA S.A.\nIVA 4,50\nBASE 25,36\nIMPORTE TARJETA 29,86\nCAMBIO 0,00";
        let amount = AmountExtractor::new().extract(text);
        assert_eq!(amount.value, 29.86);
        assert!((90..=95).contains(&amount.confidence()));
    }

    #[test]
    fn test_keyword_tolerates_newlines() {
        let text = "TOTAL A PAGAR\n\n   29.86";
        let amount = AmountExtractor::new().extract(text);
        assert_eq!(amount.value, 29.86);
        assert_eq!(amount.confidence(), 90);
    }

    #[test]
    fn test_higher_tier_wins_even_if_later_in_text() {
        let text = "TOTAL 31,00\nENTREGADO 50,00\nIMPORTE PAGADO 31,00";
        let amount = AmountExtractor::new().extract(text);
        assert_eq!(amount.confidence(), 95);
    }

    #[test]
    fn test_subtotal_is_not_total() {
        let text = "SUBTOTAL 12,00\nTOTAL COMPRA 14,52";
        let amount = AmountExtractor::new().extract(text);
        assert_eq!(amount.value, 14.52);
        assert_eq!(amount.confidence(), 80);
    }

    #[test]
    fn test_euro_suffix() {
        let amount = AmountExtractor::new().extract("Gracias\n8,40 EUR\n");
        assert_eq!(amount.value, 8.4);
        assert_eq!(amount.confidence(), 75);
    }

    #[test]
    fn test_out_of_range_match_is_skipped() {
        let text = "TOTAL 12.345,00\nTOTAL 45,10";
        let amount = AmountExtractor::new().extract(text);
        assert_eq!(amount.value, 45.1);
        assert_eq!(amount.confidence(), 70);
    }

    #[test]
    fn test_fallback_takes_largest_number() {
        let amount = AmountExtractor::new().extract("PAN 1,20\nLECHE 0,95\nHUEVOS 2,35");
        assert_eq!(amount.value, 2.35);
        assert_eq!(amount.confidence(), 40);
    }

    #[test]
    fn test_no_number_yields_sentinel() {
        let extractor = AmountExtractor::new();
        assert_eq!(extractor.extract(""), FieldValue::amount_not_found());
        assert_eq!(extractor.extract("GRACIAS POR SU VISITA"), FieldValue::amount_not_found());
    }
}
