//! Rule-based field extraction from OCR text
//!
//! Each extractor returns a `FieldValue`: a value plus a 0-100 confidence,
//! with a sentinel at confidence 0 when nothing plausible was found.
//! Extractors are pure functions of their input; the only outside input is
//! `today`, which bounds receipt dates.

mod amount;
mod category;
mod date;
mod title;

pub use amount::{parse_amount, AmountExtractor};
pub use category::CategoryExtractor;
pub use date::DateExtractor;
pub use title::TitleExtractor;

use chrono::NaiveDate;

use crate::config::AnalyzerConfig;
use crate::models::StructuredFields;

/// All four field extractors, built once from configuration
pub struct FieldExtractor {
    amount: AmountExtractor,
    date: DateExtractor,
    title: TitleExtractor,
    category: CategoryExtractor,
}

impl FieldExtractor {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            amount: AmountExtractor::new(),
            date: DateExtractor::new(config.dates),
            title: TitleExtractor::new(),
            category: CategoryExtractor::new(&config.categories),
        }
    }

    /// Run every extractor over `text`
    ///
    /// The extracted title also feeds category matching.
    pub fn extract(&self, text: &str, today: NaiveDate) -> StructuredFields {
        let title = self.title.extract(text);
        let category = self.category.extract(text, &title.value);
        StructuredFields {
            amount: self.amount.extract(text),
            date: self.date.extract(text, today),
            title,
            category,
        }
    }

    pub fn category(&self) -> &CategoryExtractor {
        &self.category
    }
}
