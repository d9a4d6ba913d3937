//! Gastos Core Library
//!
//! Receipt analysis for the gastos expense bot:
//! - Image preprocessing for classical OCR
//! - Pluggable recognition engines (Tesseract, EasyOCR, PaddleOCR, Ollama vision)
//! - Rule-based field extractors with per-field confidence
//! - Engine selection and confidence aggregation
//! - Receipt analyzer composing the pipeline
//! - CSV and SQLite expense stores

pub mod analyzer;
pub mod confidence;
pub mod config;
pub mod engines;
pub mod error;
pub mod extract;
pub mod models;
pub mod preprocess;
pub mod selector;
pub mod store;

/// Test utilities including mock Ollama and PaddleOCR servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analyzer::ReceiptAnalyzer;
pub use config::{AnalyzerConfig, CategoryRule, ConfidenceWeights, DateRange};
pub use engines::{Engine, EngineAdapter, EngineKind, MockEngine, ReceiptImage};
pub use error::{EngineFailure, Error, Result};
pub use extract::FieldExtractor;
pub use models::{
    Category, ConfidenceLevel, EntryMetadata, ExpenseEntry, ExpenseRecord, ExpenseSource,
    ExtractionResult, FieldValue, ManualExpense,
};
pub use store::{CompositeStore, CsvStore, ExpenseStore, SqliteStore};
