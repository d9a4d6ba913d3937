//! Neural OCR via the `easyocr` CLI

use std::io::Write as _;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::EasyOcrConfig;
use crate::error::{Error, Result};
use crate::models::ExtractionResult;

use super::parsing::parse_easyocr_output;
use super::{spawn_error, truncate, EngineAdapter, EngineKind, ReceiptImage};

/// OCR engine wrapping the `easyocr` command-line tool
///
/// Slower than tesseract but copes better with noisy or skewed photos, so it
/// reads the original image.
#[derive(Debug, Clone)]
pub struct EasyOcrEngine {
    binary: String,
    languages: Vec<String>,
    use_gpu: bool,
}

impl EasyOcrEngine {
    pub fn new(config: &EasyOcrConfig, use_gpu: bool) -> Self {
        Self {
            binary: config.binary.clone(),
            languages: config.languages.clone(),
            use_gpu,
        }
    }

    fn command(&self, input: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-l")
            .args(&self.languages)
            .arg("-f")
            .arg(input)
            .arg("--detail")
            .arg("1")
            .arg("--gpu")
            .arg(if self.use_gpu { "True" } else { "False" })
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl EngineAdapter for EasyOcrEngine {
    fn name(&self) -> &str {
        "easyocr"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::EasyOcr
    }

    fn needs_preprocessing(&self) -> bool {
        false
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult> {
        let tmpdir = tempfile::TempDir::with_prefix("gastos-easyocr")?;
        let input_path = tmpdir.path().join(format!("input.{}", image.extension()));
        let mut input_file = std::fs::File::create(&input_path)?;
        input_file.write_all(image.original())?;
        input_file.flush()?;

        let output = self
            .command(&input_path)
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

        let ocr = parse_easyocr_output(&String::from_utf8_lossy(&output.stdout));
        Ok(ExtractionResult::succeeded(
            self.name(),
            ocr.text,
            ocr.confidence,
        ))
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.binary)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let engine = EasyOcrEngine::new(&EasyOcrConfig::default(), true);
        let cmd = engine.command(std::path::Path::new("/tmp/r.jpg"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-l", "es", "en", "-f", "/tmp/r.jpg", "--detail", "1", "--gpu", "True"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let config = EasyOcrConfig {
            binary: "gastos-no-such-easyocr".into(),
            ..Default::default()
        };
        let engine = EasyOcrEngine::new(&config, false);
        let result = engine.run(&ReceiptImage::new(vec![1, 2, 3])).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }
}
