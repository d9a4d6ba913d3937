//! Data models for gastos

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::config::ConfidenceWeights;
use crate::error::{Error, Result};

/// Placeholder title used when a manual entry has no title
pub const UNTITLED: &str = "Sin título";

/// Largest amount accepted for a manually entered expense
pub const MAX_MANUAL_AMOUNT: f64 = 100_000.0;

/// Date used when no receipt date could be found
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Round to cents
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lowercase and strip diacritics ("Cafetería" -> "cafeteria")
pub fn fold_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Expense category
///
/// The set is closed and shared with the persistence layer; which keywords
/// select each category is configuration (see `CategoryRule`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Comida,
    Transporte,
    Compras,
    Entretenimiento,
    #[default]
    Otros,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comida => "Comida",
            Self::Transporte => "Transporte",
            Self::Compras => "Compras",
            Self::Entretenimiento => "Entretenimiento",
            Self::Otros => "Otros",
        }
    }

    /// All categories in canonical order
    pub fn all() -> &'static [Category] {
        &[
            Self::Comida,
            Self::Transporte,
            Self::Compras,
            Self::Entretenimiento,
            Self::Otros,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match fold_text(s.trim()).as_str() {
            "comida" => Ok(Self::Comida),
            "transporte" => Ok(Self::Transporte),
            "compras" => Ok(Self::Compras),
            "entretenimiento" => Ok(Self::Entretenimiento),
            "otros" => Ok(Self::Otros),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// An extracted value paired with a 0-100 confidence
///
/// "Not found" is a sentinel value at confidence 0, never an absent value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue<T> {
    pub value: T,
    confidence: u8,
}

impl<T> FieldValue<T> {
    /// Create a field value, clamping the confidence into 0..=100
    pub fn new(value: T, confidence: i32) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0, 100) as u8,
        }
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn is_found(&self) -> bool {
        self.confidence > 0
    }
}

impl FieldValue<f64> {
    pub fn amount_not_found() -> Self {
        Self::new(0.0, 0)
    }
}

impl FieldValue<NaiveDate> {
    pub fn date_not_found() -> Self {
        Self::new(sentinel_date(), 0)
    }
}

impl FieldValue<String> {
    pub fn title_not_found() -> Self {
        Self::new(String::new(), 0)
    }
}

impl FieldValue<Category> {
    pub fn category_not_found() -> Self {
        Self::new(Category::Otros, 0)
    }
}

/// Fields a vision model returned directly (already validated)
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredFields {
    pub amount: FieldValue<f64>,
    pub date: FieldValue<NaiveDate>,
    pub title: FieldValue<String>,
    pub category: FieldValue<Category>,
}

/// Outcome of running one engine adapter against one image
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub engine_name: String,
    pub raw_text: String,
    /// Engine-reported confidence, 0-100
    pub ocr_confidence: f64,
    pub success: bool,
    pub error: Option<String>,
    /// Present only for engines that answer with structured fields
    pub structured: Option<StructuredFields>,
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub fn succeeded(engine: &str, raw_text: String, ocr_confidence: f64) -> Self {
        Self {
            engine_name: engine.to_string(),
            raw_text,
            ocr_confidence: ocr_confidence.clamp(0.0, 100.0),
            success: true,
            error: None,
            structured: None,
            duration_ms: 0,
        }
    }

    pub fn failed(engine: &str, error: impl Into<String>) -> Self {
        Self {
            engine_name: engine.to_string(),
            raw_text: String::new(),
            ocr_confidence: 0.0,
            success: false,
            error: Some(error.into()),
            structured: None,
            duration_ms: 0,
        }
    }

    pub fn with_structured(mut self, fields: StructuredFields) -> Self {
        self.structured = Some(fields);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// A fully analyzed receipt
///
/// `overall_confidence` is always derived from the field confidences and the
/// configured weights; there is no way to set it independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRecord {
    amount: FieldValue<f64>,
    date: FieldValue<NaiveDate>,
    title: FieldValue<String>,
    category: FieldValue<Category>,
    overall_confidence: f64,
    engine_used: String,
    raw_text: String,
}

impl ExpenseRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        amount: FieldValue<f64>,
        date: FieldValue<NaiveDate>,
        title: FieldValue<String>,
        category: FieldValue<Category>,
        weights: &ConfidenceWeights,
        engine_used: &str,
        raw_text: String,
    ) -> Self {
        let overall_confidence = crate::confidence::overall_confidence(
            weights,
            amount.confidence(),
            date.confidence(),
            title.confidence(),
            category.confidence(),
        );
        Self {
            amount,
            date,
            title,
            category,
            overall_confidence,
            engine_used: engine_used.to_string(),
            raw_text,
        }
    }

    pub fn amount(&self) -> &FieldValue<f64> {
        &self.amount
    }

    pub fn date(&self) -> &FieldValue<NaiveDate> {
        &self.date
    }

    pub fn title(&self) -> &FieldValue<String> {
        &self.title
    }

    pub fn category(&self) -> &FieldValue<Category> {
        &self.category
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn engine_used(&self) -> &str {
        &self.engine_used
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.overall_confidence)
    }
}

/// Coarse confidence tier front-ends use to decide on manual review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::High
        } else if score >= 60.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::High => "🟢",
            Self::Medium => "🟡",
            Self::Low => "🔴",
        }
    }

    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Low)
    }
}

/// Where a stored expense came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseSource {
    #[default]
    Photo,
    Manual,
}

impl ExpenseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ExpenseSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(Self::Photo),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown expense source: {}", s)),
        }
    }
}

/// A persisted expense row: the analyzed fields plus caller metadata
///
/// Field order matches the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub date: NaiveDate,
    pub amount: f64,
    pub category: Category,
    pub payer: String,
    pub telegram_user: Option<String>,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub processed_at: String,
    pub source: ExpenseSource,
    pub receipt_path: Option<String>,
    pub receipt_file_id: Option<String>,
    pub title: String,
    pub model: Option<String>,
    pub overall_confidence: Option<f64>,
}

/// Timestamp format used for `processed_at`
pub const PROCESSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Caller-supplied metadata attached to an analyzed receipt before storage
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    pub payer: String,
    pub telegram_user: Option<String>,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub receipt_path: Option<String>,
    pub receipt_file_id: Option<String>,
}

impl ExpenseEntry {
    /// Build a photo entry from an analyzed record
    ///
    /// `category` lets the user override the suggested category.
    pub fn from_record(
        record: &ExpenseRecord,
        category: Option<Category>,
        meta: EntryMetadata,
        processed_at: DateTime<Local>,
    ) -> Self {
        let title = if record.title().value.is_empty() {
            UNTITLED.to_string()
        } else {
            record.title().value.clone()
        };
        Self {
            date: record.date().value,
            amount: record.amount().value,
            category: category.unwrap_or(record.category().value),
            payer: meta.payer,
            telegram_user: meta.telegram_user,
            chat_id: meta.chat_id,
            message_id: meta.message_id,
            processed_at: processed_at.format(PROCESSED_AT_FORMAT).to_string(),
            source: ExpenseSource::Photo,
            receipt_path: meta.receipt_path,
            receipt_file_id: meta.receipt_file_id,
            title,
            model: Some(record.engine_used().to_string()),
            overall_confidence: Some(record.overall_confidence()),
        }
    }
}

/// A manually entered expense awaiting validation
#[derive(Debug, Clone)]
pub struct ManualExpense {
    pub amount: f64,
    pub date: String,
    pub title: Option<String>,
    pub category: Category,
    pub payer: String,
}

impl ManualExpense {
    /// Validate the user input and turn it into a storable entry
    ///
    /// Amount must be in (0, 100000]; date must be `YYYY-MM-DD` and not after `today`.
    pub fn into_entry(
        self,
        today: NaiveDate,
        processed_at: DateTime<Local>,
    ) -> Result<ExpenseEntry> {
        if !self.amount.is_finite() || self.amount <= 0.0 || self.amount > MAX_MANUAL_AMOUNT {
            return Err(Error::InvalidData(format!(
                "Amount must be greater than 0 and at most {}",
                MAX_MANUAL_AMOUNT
            )));
        }

        let date = parse_date_input(&self.date, today).ok_or_else(|| {
            Error::InvalidData(format!(
                "Invalid date '{}': use YYYY-MM-DD, not in the future",
                self.date
            ))
        })?;

        if self.payer.trim().is_empty() {
            return Err(Error::InvalidData("Payer is required".to_string()));
        }

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        Ok(ExpenseEntry {
            date,
            amount: round_cents(self.amount),
            category: self.category,
            payer: self.payer.trim().to_string(),
            telegram_user: None,
            chat_id: None,
            message_id: None,
            processed_at: processed_at.format(PROCESSED_AT_FORMAT).to_string(),
            source: ExpenseSource::Manual,
            receipt_path: None,
            receipt_file_id: None,
            title,
            model: None,
            overall_confidence: None,
        })
    }
}

/// Parse a user-entered `YYYY-MM-DD` date, rejecting future dates
pub fn parse_date_input(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let clean = text.trim();
    if clean.is_empty() {
        return None;
    }
    let parsed = NaiveDate::parse_from_str(clean, "%Y-%m-%d").ok()?;
    if parsed > today {
        return None;
    }
    Some(parsed)
}
