//! Structured-document OCR via a PaddleOCR serving endpoint

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;

use crate::config::PaddleConfig;
use crate::error::{Error, Result};
use crate::models::ExtractionResult;

use super::parsing::parse_paddle_response;
use super::{EngineAdapter, EngineKind, ReceiptImage};

#[derive(Debug, Serialize)]
struct PaddleRequest {
    images: Vec<String>,
}

/// PaddleOCR `ocr_system` serving client
#[derive(Debug, Clone)]
pub struct PaddleOcrEngine {
    http_client: Client,
    url: String,
}

impl PaddleOcrEngine {
    pub fn new(config: &PaddleConfig) -> Self {
        Self {
            http_client: Client::new(),
            url: config.url.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EngineAdapter for PaddleOcrEngine {
    fn name(&self) -> &str {
        "paddleocr"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::PaddleOcr
    }

    fn needs_preprocessing(&self) -> bool {
        false
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResult> {
        let request = PaddleRequest {
            images: vec![base64::engine::general_purpose::STANDARD.encode(image.original())],
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::unavailable(self.name(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(
                self.name(),
                format!("serving returned HTTP {}", response.status()),
            ));
        }

        let body = response.text().await?;
        let ocr = parse_paddle_response(&body)?;
        Ok(ExtractionResult::succeeded(
            self.name(),
            ocr.text,
            ocr.confidence,
        ))
    }

    async fn health_check(&self) -> bool {
        // The serving app has no health route; any HTTP answer means it is up
        self.http_client.get(&self.url).send().await.is_ok()
    }
}
