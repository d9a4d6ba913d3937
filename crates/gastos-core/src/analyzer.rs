//! Receipt analyzer
//!
//! Composes preprocessing, engine selection, field extraction and confidence
//! aggregation into a single `analyze` call. The only error it returns is a
//! total extraction failure; a low-confidence record is still a record.

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, info};

use crate::config::AnalyzerConfig;
use crate::engines::{Engine, EngineAdapter, ReceiptImage};
use crate::error::{Error, Result};
use crate::extract::FieldExtractor;
use crate::models::{ExpenseRecord, ExtractionResult, FieldValue, StructuredFields};
use crate::selector;

/// Receipt analyzer, built once and reused across requests
pub struct ReceiptAnalyzer {
    config: AnalyzerConfig,
    engines: Vec<Engine>,
    extractor: FieldExtractor,
}

impl ReceiptAnalyzer {
    /// Build the analyzer with the engines listed in `config`
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let engines = Engine::from_config(&config)?;
        Self::with_engines(config, engines)
    }

    /// Build the analyzer with an explicit engine list (tests, CLI overrides)
    pub fn with_engines(config: AnalyzerConfig, engines: Vec<Engine>) -> Result<Self> {
        config.validate()?;
        if engines.is_empty() {
            return Err(Error::Config("at least one engine is required".into()));
        }
        let extractor = FieldExtractor::new(&config);
        Ok(Self {
            config,
            engines,
            extractor,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn engines(&self) -> &[Engine] {
        &self.engines
    }

    /// Analyze a receipt photo, bounding dates by the local date
    pub async fn analyze(&self, image_bytes: Vec<u8>) -> Result<ExpenseRecord> {
        self.analyze_at(image_bytes, Local::now().date_naive()).await
    }

    /// Analyze a receipt photo as of `today`
    pub async fn analyze_at(&self, image_bytes: Vec<u8>, today: NaiveDate) -> Result<ExpenseRecord> {
        let image = self.prepare(image_bytes).await;
        let best = selector::select(&self.engines, Arc::new(image), &self.config).await?;
        Ok(self.build_record(best, today))
    }

    /// Health of every engine, in configured order
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            report.push((engine.name().to_string(), engine.health_check().await));
        }
        report
    }

    async fn prepare(&self, image_bytes: Vec<u8>) -> ReceiptImage {
        if !self.engines.iter().any(|e| e.needs_preprocessing()) {
            return ReceiptImage::new(image_bytes);
        }

        let settings = self.config.preprocess.clone();
        let fallback = image_bytes.clone();
        match tokio::task::spawn_blocking(move || ReceiptImage::prepare(image_bytes, &settings))
            .await
        {
            Ok(image) => image,
            Err(e) => {
                debug!(error = %e, "Preprocessing task failed, using original image");
                ReceiptImage::new(fallback)
            }
        }
    }

    fn build_record(&self, best: ExtractionResult, today: NaiveDate) -> ExpenseRecord {
        let from_model = best.structured.is_some();
        let fields = match best.structured {
            Some(fields) => self.adopt_structured(fields, &best.raw_text, today),
            None => self.extractor.extract(&best.raw_text, today),
        };

        let raw_text = if from_model && !self.config.vision.store_raw_text {
            String::new()
        } else {
            best.raw_text
        };

        let record = ExpenseRecord::new(
            fields.amount,
            fields.date,
            fields.title,
            fields.category,
            &self.config.weights,
            &best.engine_name,
            raw_text,
        );
        info!(
            engine = %record.engine_used(),
            amount = record.amount().value,
            date = %record.date().value,
            category = %record.category().value,
            overall = record.overall_confidence(),
            "Receipt analyzed"
        );
        record
    }

    /// Take model-supplied fields, classifying locally when the model's
    /// category was unusable
    ///
    /// Adapters bound dates by the wall clock; the record is bounded by `today`.
    fn adopt_structured(
        &self,
        mut fields: StructuredFields,
        raw_text: &str,
        today: NaiveDate,
    ) -> StructuredFields {
        let date = fields.date.value;
        if fields.date.is_found() && (date > today || !self.config.dates.contains(date.year())) {
            debug!(%date, %today, "Dropping model date outside the accepted range");
            fields.date = FieldValue::date_not_found();
        }
        if !fields.category.is_found() {
            let local = self.extractor.category().extract(raw_text, &fields.title.value);
            debug!(category = %local.value, confidence = local.confidence(), "Local category fallback");
            fields.category = local;
        }
        fields
    }
}
