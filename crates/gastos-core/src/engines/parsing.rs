//! Output parsers for engine backends
//!
//! OCR command-line tools and model servers answer in loosely specified
//! formats; these functions turn them into text + confidence, or into
//! validated structured fields for the vision path.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::DateRange;
use crate::error::{Error, Result};
use crate::models::{round_cents, sentinel_date, Category, FieldValue, StructuredFields};

use super::truncate;

/// Largest amount a vision model may report
const MAX_VISION_AMOUNT: f64 = 100_000.0;
/// Longest merchant name kept from a vision model
const MAX_VISION_TITLE_CHARS: usize = 100;
/// Confidence assumed when the model omits or garbles it
const DEFAULT_MODEL_CONFIDENCE: i32 = 50;

/// Recognized text and its mean confidence (0-100)
#[derive(Debug, Clone, PartialEq)]
pub struct OcrText {
    pub text: String,
    pub confidence: f64,
}

impl OcrText {
    fn from_parts(lines: Vec<String>, confidences: &[f64]) -> Self {
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Self {
            text: lines.join("\n"),
            confidence,
        }
    }
}

/// Parse `tesseract ... tsv` output
///
/// Words are regrouped into lines by (page, block, paragraph, line); the
/// confidence is the mean over words with a positive confidence.
pub fn parse_tesseract_tsv(tsv: &str) -> Result<OcrText> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::malformed("tesseract", format!("TSV has no '{}' column", name)))
    };
    let key_columns = [
        column("page_num")?,
        column("block_num")?,
        column("par_num")?,
        column("line_num")?,
    ];
    let conf_col = column("conf")?;
    let text_col = column("text")?;

    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<Vec<String>> = None;
    let mut current_line: Vec<String> = Vec::new();
    let mut confidences = Vec::new();

    for record in reader.records() {
        let record = record?;
        let word = record.get(text_col).unwrap_or("").trim();
        if word.is_empty() {
            continue;
        }

        let conf: f64 = record
            .get(conf_col)
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(-1.0);
        if conf > 0.0 {
            confidences.push(conf);
        }

        let key: Vec<String> = key_columns
            .iter()
            .map(|i| record.get(*i).unwrap_or("").to_string())
            .collect();
        if current_key.as_ref() != Some(&key) {
            if !current_line.is_empty() {
                lines.push(current_line.join(" "));
                current_line.clear();
            }
            current_key = Some(key);
        }
        current_line.push(word.to_string());
    }
    if !current_line.is_empty() {
        lines.push(current_line.join(" "));
    }

    Ok(OcrText::from_parts(lines, &confidences))
}

fn easyocr_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#",\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*,\s*(?:np\.float\d*\()?([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\)?\s*\)\s*$"#,
        )
        .expect("valid regex")
    })
}

/// Parse `easyocr --detail 1` output: one `(box, 'text', confidence)` per line
///
/// Each detection becomes one line of text; confidences (0-1) are averaged
/// and scaled to 0-100.
pub fn parse_easyocr_output(output: &str) -> OcrText {
    let mut lines = Vec::new();
    let mut confidences = Vec::new();

    for line in output.lines() {
        let Some(caps) = easyocr_line_regex().captures(line.trim()) else {
            continue;
        };
        let text = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| unescape_python(m.as_str()))
            .unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }
        if let Some(conf) = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()) {
            confidences.push(conf * 100.0);
        }
        lines.push(text.trim().to_string());
    }

    OcrText::from_parts(lines, &confidences)
}

fn unescape_python(text: &str) -> String {
    text.replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

#[derive(Debug, Deserialize)]
struct PaddleResponse {
    status: Value,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    results: Vec<Vec<PaddleLine>>,
}

#[derive(Debug, Deserialize)]
struct PaddleLine {
    text: String,
    confidence: f64,
}

/// Parse a PaddleOCR serving (`/predict/ocr_system`) response body
pub fn parse_paddle_response(body: &str) -> Result<OcrText> {
    let response: PaddleResponse = serde_json::from_str(body)
        .map_err(|e| Error::malformed("paddleocr", format!("{} | Raw: {}", e, truncate(body, 200))))?;

    let status = match &response.status {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if status != "000" && status != "0" {
        return Err(Error::malformed(
            "paddleocr",
            format!("serving status {}: {}", status, response.msg),
        ));
    }

    let mut lines = Vec::new();
    let mut confidences = Vec::new();
    for line in response.results.into_iter().next().unwrap_or_default() {
        let text = line.text.trim();
        if text.is_empty() {
            continue;
        }
        lines.push(text.to_string());
        confidences.push((line.confidence * 100.0).clamp(0.0, 100.0));
    }

    Ok(OcrText::from_parts(lines, &confidences))
}

/// Extract the JSON object from a model answer
///
/// Models wrap JSON in markdown fences or chatter despite instructions; take
/// everything from the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Validated vision answer
#[derive(Debug, Clone, PartialEq)]
pub struct VisionAnswer {
    pub fields: StructuredFields,
    /// Model's own confidence, clamped to 0-100
    pub confidence: i32,
}

/// Parse and validate a vision model's JSON answer
///
/// All five fields must be present. An unreadable amount or one outside
/// [0, 100000] rejects the answer; every other problem degrades the single
/// field to its sentinel.
pub fn parse_vision_answer(
    response: &str,
    today: NaiveDate,
    years: &DateRange,
) -> Result<VisionAnswer> {
    let json = extract_json_object(response).ok_or_else(|| {
        Error::malformed("ollama", format!("No JSON found | Raw: {}", truncate(response, 200)))
    })?;
    let data: serde_json::Map<String, Value> = serde_json::from_str(json).map_err(|e| {
        Error::malformed("ollama", format!("Invalid JSON: {} | Raw: {}", e, truncate(json, 200)))
    })?;

    for field in ["amount", "date", "title", "category", "confidence"] {
        if !data.contains_key(field) {
            return Err(Error::malformed(
                "ollama",
                format!("Missing required field: {}", field),
            ));
        }
    }

    let confidence = parse_model_confidence(&data["confidence"]);

    let amount = value_as_f64(&data["amount"])
        .ok_or_else(|| Error::malformed("ollama", format!("Invalid amount: {}", data["amount"])))?;
    if !(0.0..=MAX_VISION_AMOUNT).contains(&amount) {
        return Err(Error::malformed(
            "ollama",
            format!("Amount out of range: {}", amount),
        ));
    }

    let amount = match round_cents(amount) {
        cents if cents > 0.0 => FieldValue::new(cents, confidence),
        _ => FieldValue::amount_not_found(),
    };

    let date = match parse_vision_date(&data["date"], today, years) {
        Some(date) => FieldValue::new(date, confidence),
        None => FieldValue::date_not_found(),
    };

    let title_text: String = value_as_string(&data["title"])
        .trim()
        .chars()
        .take(MAX_VISION_TITLE_CHARS)
        .collect();
    let title = if title_text.is_empty() {
        FieldValue::title_not_found()
    } else {
        FieldValue::new(title_text, confidence)
    };

    let category_text = value_as_string(&data["category"]);
    let category = match category_text.parse::<Category>() {
        Ok(category) => FieldValue::new(category, confidence),
        Err(_) => {
            warn!("Invalid category '{}' from vision model, mapping to Otros", category_text);
            FieldValue::category_not_found()
        }
    };

    Ok(VisionAnswer {
        fields: StructuredFields {
            amount,
            date,
            title,
            category,
        },
        confidence,
    })
}

fn parse_model_confidence(value: &Value) -> i32 {
    value_as_f64(value)
        .map(|c| c.round().clamp(0.0, 100.0) as i32)
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
}

fn parse_vision_date(value: &Value, today: NaiveDate, years: &DateRange) -> Option<NaiveDate> {
    let text = value_as_string(value);
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
    if date == sentinel_date() {
        return None;
    }
    if !years.contains(date.year()) || date > today {
        warn!("Vision model date {} outside accepted range, dropping it", date);
        return None;
    }
    Some(date)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
