//! Scripted engine for testing
//!
//! Returns a fixed outcome for every image, so selector and analyzer tests
//! can run without OCR binaries or a model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::DateRange;
use crate::error::{Error, Result};
use crate::models::ExtractionResult;

use super::parsing::parse_vision_answer;
use super::{EngineAdapter, EngineKind, ReceiptImage};

#[derive(Debug, Clone)]
enum MockOutcome {
    Text { text: String, confidence: f64 },
    /// Raw model answer, validated like a real vision response
    Vision { response: String },
    Fail { reason: String },
}

/// Mock engine with a scripted outcome
#[derive(Debug, Clone)]
pub struct MockEngine {
    name: String,
    kind: EngineKind,
    outcome: MockOutcome,
    delay: Option<Duration>,
    needs_preprocessing: bool,
    healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl MockEngine {
    fn with_outcome(name: &str, outcome: MockOutcome) -> Self {
        Self {
            name: name.to_string(),
            kind: EngineKind::Mock,
            outcome,
            delay: None,
            needs_preprocessing: false,
            healthy: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Engine that recognizes `text` with `confidence`
    pub fn text(name: &str, text: &str, confidence: f64) -> Self {
        Self::with_outcome(
            name,
            MockOutcome::Text {
                text: text.to_string(),
                confidence,
            },
        )
    }

    /// Engine that answers like a vision model with `response`
    pub fn vision(name: &str, response: &str) -> Self {
        Self::with_outcome(
            name,
            MockOutcome::Vision {
                response: response.to_string(),
            },
        )
    }

    /// Engine whose backend is unavailable
    pub fn failing(name: &str, reason: &str) -> Self {
        let mut engine = Self::with_outcome(
            name,
            MockOutcome::Fail {
                reason: reason.to_string(),
            },
        );
        engine.healthy = false;
        engine
    }

    /// Sleep before answering (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ask for the preprocessed image, like a classical OCR engine
    pub fn with_preprocessing(mut self) -> Self {
        self.needs_preprocessing = true;
        self
    }

    /// Report as a specific engine kind
    pub fn with_kind(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of times `extract` was called (shared across clones)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn needs_preprocessing(&self) -> bool {
        self.needs_preprocessing
    }

    async fn extract(&self, _image: &ReceiptImage) -> Result<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            MockOutcome::Text { text, confidence } => Ok(ExtractionResult::succeeded(
                &self.name,
                text.clone(),
                *confidence,
            )),
            MockOutcome::Vision { response } => {
                // No clock here: the analyzer bounds dates by its own `today`
                let answer =
                    parse_vision_answer(response, NaiveDate::MAX, &DateRange::default())?;
                Ok(
                    ExtractionResult::succeeded(&self.name, response.clone(), answer.confidence as f64)
                        .with_structured(answer.fields),
                )
            }
            MockOutcome::Fail { reason } => Err(Error::unavailable(&self.name, reason.clone())),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_outcome() {
        let engine = MockEngine::text("a", "GRUPO DIA", 88.0);
        let result = engine.run(&ReceiptImage::new(vec![])).await;
        assert!(result.success);
        assert_eq!(result.raw_text, "GRUPO DIA");
        assert_eq!(result.ocr_confidence, 88.0);
        assert_eq!(engine.calls(), 1);
        assert!(engine.health_check().await);
    }

    #[tokio::test]
    async fn test_vision_outcome_goes_through_validation() {
        let engine = MockEngine::vision("v", r#"{"amount": 3, "date": "x", "title": "Bar", "category": "Nope", "confidence": 70}"#);
        let result = engine.run(&ReceiptImage::new(vec![])).await;
        let fields = result.structured.unwrap();
        assert_eq!(fields.amount.confidence(), 70);
        assert_eq!(fields.date.confidence(), 0);
        assert_eq!(fields.category.confidence(), 0);
    }

    #[tokio::test]
    async fn test_calls_are_shared_between_clones() {
        let engine = MockEngine::text("a", "x", 1.0);
        let clone = engine.clone();
        clone.run(&ReceiptImage::new(vec![])).await;
        assert_eq!(engine.calls(), 1);
    }
}
