//! Merchant title extraction
//!
//! The merchant name is usually printed at the top of the receipt, so the
//! first few non-empty lines are candidates, in order, with confidence
//! falling the further down the line is.

use regex::Regex;
use tracing::debug;

use crate::models::FieldValue;

/// Confidence by position among the non-empty lines
const LINE_CONFIDENCE: [i32; 3] = [85, 70, 50];

const MIN_TITLE_CHARS: usize = 3;
const MAX_TITLE_CHARS: usize = 50;

pub struct TitleExtractor {
    digits: Regex,
    symbols: Regex,
    spaces: Regex,
}

impl Default for TitleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TitleExtractor {
    pub fn new() -> Self {
        Self {
            digits: Regex::new(r"\d+").expect("valid regex"),
            symbols: Regex::new(r"[^\w\s-]").expect("valid regex"),
            spaces: Regex::new(r"\s+").expect("valid regex"),
        }
    }

    /// Strip digits and punctuation, collapse whitespace
    pub fn clean(&self, line: &str) -> String {
        let line = self.digits.replace_all(line, "");
        let line = self.symbols.replace_all(&line, "");
        self.spaces.replace_all(line.trim(), " ").into_owned()
    }

    pub fn extract(&self, text: &str) -> FieldValue<String> {
        let candidates = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .zip(LINE_CONFIDENCE);

        for (line, confidence) in candidates {
            let cleaned = self.clean(line);
            if cleaned.chars().count() >= MIN_TITLE_CHARS {
                let title: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
                let title = title.trim_end().to_string();
                debug!(title = %title, confidence, "Title found");
                return FieldValue::new(title, confidence);
            }
        }

        FieldValue::title_not_found()
    }
}
