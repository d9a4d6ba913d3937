//! Receipt date extraction
//!
//! Dates next to a date keyword are tried first, across every format, then
//! bare dates. Within a pass, formats go compact `YYYYMMDD`, then
//! `DD/MM/YYYY`, then `YYYY/MM/DD`. A candidate is accepted only if it is a
//! real calendar date, its year is in the configured range and it is not in
//! the future.

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::DateRange;
use crate::models::FieldValue;

/// Bonus for a date anchored on a keyword
const KEYWORD_BONUS: i32 = 20;
const MAX_CONFIDENCE: i32 = 90;

const KEYWORDS: &str = r"(?:fecha|date|d[ií]a|ticket|operaci[oó]n)";

#[derive(Debug, Clone, Copy)]
enum Layout {
    /// year, month, day capture groups
    YearFirst,
    /// day, month, year capture groups
    DayFirst,
}

struct DateFormat {
    name: &'static str,
    layout: Layout,
    bare: Regex,
    anchored: Regex,
    confidence: i32,
}

impl DateFormat {
    fn new(name: &'static str, pattern: &str, layout: Layout, confidence: i32) -> Self {
        Self {
            name,
            layout,
            bare: Regex::new(pattern).expect("valid regex"),
            anchored: Regex::new(&format!(r"(?i){}[^\d]{{0,20}}?{}", KEYWORDS, pattern))
                .expect("valid regex"),
            confidence,
        }
    }

    fn to_date(&self, caps: &Captures) -> Option<NaiveDate> {
        let number = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
        let (year, month, day) = match self.layout {
            Layout::YearFirst => (number(1)?, number(2)?, number(3)?),
            Layout::DayFirst => (number(3)?, number(2)?, number(1)?),
        };
        // Two-digit years are read as 20YY
        let year = if year < 100 { 2000 + year } else { year };
        NaiveDate::from_ymd_opt(year as i32, month, day)
    }
}

pub struct DateExtractor {
    formats: Vec<DateFormat>,
    years: DateRange,
}

impl DateExtractor {
    pub fn new(years: DateRange) -> Self {
        let formats = vec![
            DateFormat::new(
                "compact",
                r"(\d{4})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])",
                Layout::YearFirst,
                50,
            ),
            DateFormat::new(
                "dmy",
                r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b",
                Layout::DayFirst,
                70,
            ),
            DateFormat::new(
                "dmy-short",
                r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2})\b",
                Layout::DayFirst,
                60,
            ),
            DateFormat::new(
                "ymd",
                r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b",
                Layout::YearFirst,
                70,
            ),
        ];
        Self { formats, years }
    }

    /// Extract the receipt date; `today` bounds it from above
    pub fn extract(&self, text: &str, today: NaiveDate) -> FieldValue<NaiveDate> {
        let is_valid = |date: &NaiveDate| self.years.contains(date.year()) && *date <= today;

        for anchored in [true, false] {
            for format in &self.formats {
                let regex = if anchored { &format.anchored } else { &format.bare };
                let found = regex
                    .captures_iter(text)
                    .filter_map(|caps| format.to_date(&caps))
                    .find(|date| is_valid(date));

                if let Some(date) = found {
                    let confidence = if anchored {
                        (format.confidence + KEYWORD_BONUS).min(MAX_CONFIDENCE)
                    } else {
                        format.confidence
                    };
                    debug!(format = format.name, anchored, %date, confidence, "Date found");
                    return FieldValue::new(date, confidence);
                }
            }
        }

        FieldValue::date_not_found()
    }
}
