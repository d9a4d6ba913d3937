//! Pluggable recognition engines
//!
//! Every engine turns a receipt image into raw text plus a 0-100 confidence.
//!
//! # Architecture
//!
//! - `EngineAdapter` trait: the uniform `extract` / `run` contract
//! - `Engine` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Implementations: `TesseractEngine` (classical OCR), `EasyOcrEngine` (neural
//!   OCR), `PaddleOcrEngine` (structured OCR), `OllamaVisionEngine` (vision
//!   model), `MockEngine` (scripted, for tests)
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = AnalyzerConfig::load(None)?;
//! let engines = Engine::from_config(&config)?;
//! let image = ReceiptImage::prepare(bytes, &config.preprocess);
//! for engine in &engines {
//!     let result = engine.run(&image).await;
//!     println!("{}: {:.1}%", result.engine_name, result.ocr_confidence);
//! }
//! ```

mod easyocr;
mod mock;
mod ollama;
mod paddle;
pub mod parsing;
mod tesseract;

pub use easyocr::EasyOcrEngine;
pub use mock::MockEngine;
pub use ollama::OllamaVisionEngine;
pub use paddle::PaddleOcrEngine;
pub use tesseract::TesseractEngine;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{AnalyzerConfig, PreprocessConfig};
use crate::error::{Error, Result};
use crate::models::ExtractionResult;
use crate::preprocess::{encode_png, preprocess};

/// Known engine backends, by stable config name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Classical OCR (tesseract CLI)
    Tesseract,
    /// Neural OCR (easyocr CLI)
    EasyOcr,
    /// Structured-document OCR (PaddleOCR serving)
    PaddleOcr,
    /// Vision language model (Ollama)
    Ollama,
    /// Scripted engine for tests; never loaded from config
    #[serde(skip)]
    Mock,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::EasyOcr => "easyocr",
            Self::PaddleOcr => "paddleocr",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }

    /// Human-readable engine family
    pub fn family(&self) -> &'static str {
        match self {
            Self::Tesseract => "classical OCR",
            Self::EasyOcr => "neural OCR",
            Self::PaddleOcr => "structured OCR",
            Self::Ollama => "vision model",
            Self::Mock => "scripted",
        }
    }

    /// Engines a user can configure
    pub fn configurable() -> &'static [EngineKind] {
        &[Self::Tesseract, Self::EasyOcr, Self::PaddleOcr, Self::Ollama]
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "easyocr" => Ok(Self::EasyOcr),
            "paddleocr" | "paddle" => Ok(Self::PaddleOcr),
            "ollama" | "vision" => Ok(Self::Ollama),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }
}

/// A receipt photo ready to hand to engines
///
/// Classical OCR reads the preprocessed rendition when there is one; model
/// based engines always read the original bytes.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    original: Vec<u8>,
    preprocessed: Option<Vec<u8>>,
}

impl ReceiptImage {
    /// Wrap image bytes without preprocessing
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            original: bytes,
            preprocessed: None,
        }
    }

    /// Decode and preprocess for classical OCR
    ///
    /// Undecodable bytes are kept as-is: engines that accept them still get
    /// a chance, the rest fail on their own.
    pub fn prepare(bytes: Vec<u8>, config: &PreprocessConfig) -> Self {
        let preprocessed = match image::load_from_memory(&bytes) {
            Ok(decoded) => match encode_png(&preprocess(&decoded, config)) {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!("Failed to encode preprocessed image: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Could not decode receipt image, skipping preprocessing: {}", e);
                None
            }
        };
        Self {
            original: bytes,
            preprocessed,
        }
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn preprocessed(&self) -> Option<&[u8]> {
        self.preprocessed.as_deref()
    }

    /// SHA-256 of the original bytes, hex encoded
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(&self.original))
    }

    /// File extension matching the original bytes
    pub fn extension(&self) -> &'static str {
        image::guess_format(&self.original)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png")
    }
}

/// Trait implemented by every recognition backend
///
/// `extract` reports backend problems as typed errors; `run` is the
/// infallible wrapper the selector uses.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Engine name used in results and logs
    fn name(&self) -> &str;

    fn kind(&self) -> EngineKind;

    /// Whether this engine wants the preprocessed rendition
    fn needs_preprocessing(&self) -> bool;

    /// Recognize the receipt
    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult>;

    /// Check whether the backend is installed / reachable
    async fn health_check(&self) -> bool;

    /// Recognize the receipt, absorbing failures into the result
    async fn run(&self, image: &ReceiptImage) -> ExtractionResult {
        let started = Instant::now();
        let outcome = self.extract(image).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                debug!(
                    engine = %self.name(),
                    duration_ms,
                    chars = result.raw_text.len(),
                    confidence = result.ocr_confidence,
                    "Engine finished"
                );
                result.with_duration(duration_ms)
            }
            Err(e) => {
                let reason = truncate(&e.to_string(), 200);
                warn!(engine = %self.name(), duration_ms, error = %reason, "Engine failed");
                ExtractionResult::failed(self.name(), reason).with_duration(duration_ms)
            }
        }
    }
}

/// Concrete engine enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead, so the
/// selector can move engines into spawned tasks.
#[derive(Clone)]
pub enum Engine {
    Tesseract(TesseractEngine),
    EasyOcr(EasyOcrEngine),
    PaddleOcr(PaddleOcrEngine),
    Ollama(OllamaVisionEngine),
    Mock(MockEngine),
}

impl Engine {
    /// Build one engine from configuration
    pub fn from_kind(kind: EngineKind, config: &AnalyzerConfig) -> Result<Self> {
        match kind {
            EngineKind::Tesseract => Ok(Engine::Tesseract(TesseractEngine::new(&config.tesseract))),
            EngineKind::EasyOcr => Ok(Engine::EasyOcr(EasyOcrEngine::new(
                &config.easyocr,
                config.use_gpu,
            ))),
            EngineKind::PaddleOcr => Ok(Engine::PaddleOcr(PaddleOcrEngine::new(&config.paddle))),
            EngineKind::Ollama => Ok(Engine::Ollama(OllamaVisionEngine::new(
                &config.vision,
                config.dates,
            ))),
            EngineKind::Mock => Err(Error::Config(
                "the mock engine cannot be loaded from configuration".into(),
            )),
        }
    }

    /// Build every configured engine, in priority order
    pub fn from_config(config: &AnalyzerConfig) -> Result<Vec<Self>> {
        config
            .engines
            .iter()
            .map(|kind| Self::from_kind(*kind, config))
            .collect()
    }

    pub fn mock(engine: MockEngine) -> Self {
        Engine::Mock(engine)
    }
}

// Implement EngineAdapter for Engine by delegating to the inner engine
#[async_trait]
impl EngineAdapter for Engine {
    fn name(&self) -> &str {
        match self {
            Engine::Tesseract(e) => e.name(),
            Engine::EasyOcr(e) => e.name(),
            Engine::PaddleOcr(e) => e.name(),
            Engine::Ollama(e) => e.name(),
            Engine::Mock(e) => e.name(),
        }
    }

    fn kind(&self) -> EngineKind {
        match self {
            Engine::Tesseract(e) => e.kind(),
            Engine::EasyOcr(e) => e.kind(),
            Engine::PaddleOcr(e) => e.kind(),
            Engine::Ollama(e) => e.kind(),
            Engine::Mock(e) => e.kind(),
        }
    }

    fn needs_preprocessing(&self) -> bool {
        match self {
            Engine::Tesseract(e) => e.needs_preprocessing(),
            Engine::EasyOcr(e) => e.needs_preprocessing(),
            Engine::PaddleOcr(e) => e.needs_preprocessing(),
            Engine::Ollama(e) => e.needs_preprocessing(),
            Engine::Mock(e) => e.needs_preprocessing(),
        }
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult> {
        match self {
            Engine::Tesseract(e) => e.extract(image).await,
            Engine::EasyOcr(e) => e.extract(image).await,
            Engine::PaddleOcr(e) => e.extract(image).await,
            Engine::Ollama(e) => e.extract(image).await,
            Engine::Mock(e) => e.extract(image).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Engine::Tesseract(e) => e.health_check().await,
            Engine::EasyOcr(e) => e.health_check().await,
            Engine::PaddleOcr(e) => e.health_check().await,
            Engine::Ollama(e) => e.health_check().await,
            Engine::Mock(e) => e.health_check().await,
        }
    }
}

/// Truncate long backend messages for logs and failure reasons
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Map a subprocess spawn error: a missing binary means the engine is not installed
pub(crate) fn spawn_error(engine: &str, binary: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::unavailable(engine, format!("'{}' not found in PATH", binary))
    } else {
        Error::unavailable(engine, format!("failed to start '{}': {}", binary, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_round_trip_names() {
        for kind in EngineKind::configurable() {
            assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), *kind);
        }
        assert_eq!("Paddle".parse::<EngineKind>().unwrap(), EngineKind::PaddleOcr);
        assert!("mock".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_from_config_keeps_priority_order() {
        let config = AnalyzerConfig {
            engines: vec![EngineKind::Ollama, EngineKind::Tesseract],
            ..Default::default()
        };
        let engines = Engine::from_config(&config).unwrap();
        let names: Vec<_> = engines.iter().map(|e| e.kind()).collect();
        assert_eq!(names, vec![EngineKind::Ollama, EngineKind::Tesseract]);
        assert!(engines[1].needs_preprocessing());
        assert!(!engines[0].needs_preprocessing());
    }

    #[test]
    fn test_mock_kind_is_not_configurable() {
        let config = AnalyzerConfig::default();
        assert!(Engine::from_kind(EngineKind::Mock, &config).is_err());
    }

    #[test]
    fn test_receipt_image_without_decodable_bytes() {
        let image = ReceiptImage::prepare(b"not an image".to_vec(), &PreprocessConfig::default());
        assert!(image.preprocessed().is_none());
        assert_eq!(image.original(), b"not an image");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn test_receipt_image_is_preprocessed() {
        let png = encode_png(&image::DynamicImage::new_luma8(20, 10)).unwrap();
        let image = ReceiptImage::prepare(png, &PreprocessConfig::default());
        let pre = image::load_from_memory(image.preprocessed().unwrap()).unwrap();
        assert_eq!((pre.width(), pre.height()), (40, 20));
    }

    #[test]
    fn test_content_hash() {
        let image = ReceiptImage::new(b"abc".to_vec());
        assert_eq!(
            image.content_hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_run_absorbs_errors() {
        let engine = Engine::mock(MockEngine::failing("flaky", "backend exploded"));
        let result = engine.run(&ReceiptImage::new(vec![])).await;
        assert!(!result.success);
        assert_eq!(result.engine_name, "flaky");
        assert!(result.error.unwrap().contains("backend exploded"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
