//! Classical OCR via the `tesseract` CLI

use std::io::Write as _;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::TesseractConfig;
use crate::error::{Error, Result};
use crate::models::ExtractionResult;

use super::parsing::{parse_tesseract_tsv, OcrText};
use super::{spawn_error, truncate, EngineAdapter, EngineKind, ReceiptImage};

/// The raw pass must be this much longer to beat the preprocessed one outright
const RAW_LENGTH_ADVANTAGE: f64 = 1.2;
/// ...and at least this confident
const RAW_MIN_CONFIDENCE: f64 = 50.0;

/// OCR engine wrapping the `tesseract` CLI tool
///
/// Runs two passes, one over the untouched photo (better for clean prints) and
/// one over the preprocessed image (better for poor photos), and keeps the
/// better of the two.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    languages: String,
}

impl TesseractEngine {
    pub fn new(config: &TesseractConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            languages: config.languages.clone(),
        }
    }

    async fn recognize(&self, bytes: &[u8], extension: &str) -> Result<OcrText> {
        // Write our input to a temporary file
        let tmpdir = tempfile::TempDir::with_prefix("gastos-tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        let mut input_file = std::fs::File::create(&input_path)?;
        input_file.write_all(bytes)?;
        input_file.flush()?;

        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("tsv")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(self.name(), &self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::unavailable(
                self.name(),
                format!("exited with {}: {}", output.status, truncate(stderr.trim(), 200)),
            ));
        }

        parse_tesseract_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Pick between the raw and preprocessed passes
pub(crate) fn choose_pass(raw: OcrText, preprocessed: OcrText) -> (&'static str, OcrText) {
    let raw_len = raw.text.chars().count() as f64;
    let pre_len = preprocessed.text.chars().count() as f64;

    if raw_len > pre_len * RAW_LENGTH_ADVANTAGE && raw.confidence > RAW_MIN_CONFIDENCE {
        return ("raw", raw);
    }

    let raw_score = raw_len * raw.confidence / 100.0;
    let pre_score = pre_len * preprocessed.confidence / 100.0;
    if raw_score > pre_score {
        ("raw", raw)
    } else {
        ("preprocessed", preprocessed)
    }
}

#[async_trait]
impl EngineAdapter for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn needs_preprocessing(&self) -> bool {
        true
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult> {
        let raw = self.recognize(image.original(), image.extension()).await?;

        let (pass, best) = match image.preprocessed() {
            Some(pre_bytes) => match self.recognize(pre_bytes, "png").await {
                Ok(pre) => choose_pass(raw, pre),
                Err(e) => {
                    debug!("Preprocessed tesseract pass failed, keeping raw: {}", e);
                    ("raw", raw)
                }
            },
            None => ("raw", raw),
        };

        debug!(
            pass,
            chars = best.text.len(),
            confidence = best.confidence,
            "Tesseract pass selected"
        );
        Ok(ExtractionResult::succeeded(
            self.name(),
            best.text,
            best.confidence,
        ))
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ocr(text: &str, confidence: f64) -> OcrText {
        OcrText {
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_raw_wins_when_much_longer_and_confident() {
        let (pass, _) = choose_pass(ocr(&"x".repeat(130), 55.0), ocr(&"x".repeat(100), 95.0));
        assert_eq!(pass, "raw");
    }

    #[test]
    fn test_raw_needs_confidence_to_win_on_length() {
        // 130 * 0.45 = 58.5 < 100 * 0.95 = 95
        let (pass, _) = choose_pass(ocr(&"x".repeat(130), 45.0), ocr(&"x".repeat(100), 95.0));
        assert_eq!(pass, "preprocessed");
    }

    #[test]
    fn test_falls_back_to_length_times_confidence() {
        let (pass, best) = choose_pass(ocr(&"x".repeat(100), 90.0), ocr(&"x".repeat(110), 70.0));
        assert_eq!(pass, "raw");
        assert_eq!(best.confidence, 90.0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::new(&TesseractConfig {
            binary: "gastos-no-such-tesseract".into(),
            languages: "spa".into(),
        });
        let err = engine
            .extract(&ReceiptImage::new(vec![0u8; 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterUnavailable { .. }));
        assert!(!engine.health_check().await);
    }
}
